fn main() {
    std::process::exit(simcheck_cli::cli::run_from_env());
}
