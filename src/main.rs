fn main() {
    if let Err(err) = storyvoice::run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
