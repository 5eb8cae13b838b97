fn main() {
    if let Err(err) = playtally_lib::run() {
        eprintln!("playtally: {err:#}");
        std::process::exit(1);
    }
}
