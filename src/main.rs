fn main() {
    if let Err(err) = parkgate_lib::run() {
        log::error!("parkgate failed: {err:#}");
        eprintln!("parkgate: {err:#}");
        std::process::exit(1);
    }
}
