fn main() {
    if let Err(err) = coffee_analytics::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
