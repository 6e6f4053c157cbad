fn main() {
    if let Err(err) = schema_consolidator::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
