fn main() {
    if let Err(err) = lake_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
