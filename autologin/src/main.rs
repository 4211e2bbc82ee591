use autologin::handlers::*;
use autologin_core::print_banner;
use commands::command_argument_builder;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(primary_command),
        Some(("credentials", primary_command)) => match primary_command.subcommand() {
            Some(("add", secondary_command)) => handle_credentials_add(secondary_command),
            Some(("list", secondary_command)) => handle_credentials_list(secondary_command),
            Some(("remove", secondary_command)) => handle_credentials_remove(secondary_command),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("discover", primary_command)) => handle_discover(primary_command).await,
        Some(("login", primary_command)) => handle_login(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
