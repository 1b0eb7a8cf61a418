fn main() {
    if let Err(error) = signal_desk_lib::run() {
        eprintln!("signal-desk: {error}");
        std::process::exit(1);
    }
}
