use clap::error::ErrorKind;
use clap::CommandFactory;
use log::LevelFilter;
use unchm::{cli, dispatch};

fn main() {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        builder.filter(None, LevelFilter::Info);
    }
    builder.init();

    let matches = match cli::Cli::command().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            // Help and version print to stdout and succeed; everything else
            // is a usage error.
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let result = cli::resolve(&matches).and_then(|task| dispatch::run(&task));
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
