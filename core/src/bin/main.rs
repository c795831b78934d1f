/// Dungeon DSL command-line front end
///
/// Checks and runs dungeon configuration files against the standard
/// environment.
use dungeon_dsl::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
