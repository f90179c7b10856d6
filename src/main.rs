mod app;
mod claude_config;
mod cli;
mod error;
mod event_log;
mod fs_util;
mod keychain;
mod oauth;
mod paths;
mod process;
mod profile;
mod state;

use app::SwitchApp;
use cli::CliCommand;
use error::SwitchResult;
use paths::Settings;

fn main() {
    if let Err(err) = run() {
        eprintln!("claude-switch: {}", err);
        std::process::exit(err.exit_code());
    }
}

fn run() -> SwitchResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = CliCommand::parse(&args)?;
    let app = SwitchApp::new(Settings::from_env());

    match command {
        CliCommand::Help => {
            app.print_usage();
            Ok(())
        }
        CliCommand::Add { name, label } => app.add_profile(&name, label),
        CliCommand::Import { name, label } => app.import_profile(&name, label),
        CliCommand::Use(name) => app.use_profile(&name).map(|_| ()),
        CliCommand::List => app.list_profiles(),
        CliCommand::Remove(name) => app.remove_profile(&name),
        CliCommand::Exec { name, command } => app.exec_profile(&name, &command),
    }
}
