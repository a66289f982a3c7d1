extern crate stackcat;

use std::process;

use stackcat::cli;

fn main() {
    if let Err(e) = stackcat::init() {
        eprintln!("stackcat: {}", e);
        process::exit(1);
    }

    let matches = cli::build_app().get_matches();

    let verbosity = matches.occurrences_of("verbose") as u64;
    let level = if matches.is_present("quiet") {
        log::Level::Error
    } else {
        match verbosity {
            0 => log::Level::Info,
            1 => log::Level::Debug,
            _ => log::Level::Trace,
        }
    };
    loggerv::init_with_level(level).unwrap_or(());

    match cli::dispatch(&matches) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("stackcat: {}", e);
            process::exit(cli::exit_code(&e));
        }
    }
}
