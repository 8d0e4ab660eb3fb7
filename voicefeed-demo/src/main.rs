mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    // Optional scenario name, runs all of them by default
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => cli::run_all(),
        Some(name) => cli::run_scenario(name),
    }
}
