fn main() {
    if let Err(err) = forcefocus_lib::run() {
        log::error!("forcefocus failed: {err:#}");
        std::process::exit(1);
    }
}
