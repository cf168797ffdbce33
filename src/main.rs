fn main() {
    if let Err(err) = candidate_triage::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
