fn main() {
    if let Err(err) = platewatch_lib::run() {
        eprintln!("platewatch: {err:#}");
        std::process::exit(1);
    }
}
