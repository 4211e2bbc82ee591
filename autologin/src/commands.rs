use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("autologin")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("autologin")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the autologin database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the autologin database")
                        .default_value("~/.config/autologin/"),
                )
                .arg(
                    arg!(-f - -"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("credentials")
                .about("Manage stored credential sets")
                .subcommand(
                    command!("add")
                        .about("Store a credential set for a target site")
                        .arg(
                            arg!(-u --"url" <URL>)
                                .required(true)
                                .help("The site these credentials belong to")
                                .value_parser(clap::value_parser!(Url)),
                        )
                        .arg(
                            arg!(-n --"username" <USERNAME>)
                                .required(true)
                                .help("The username or email to log in with"),
                        )
                        .arg(
                            arg!(-p --"password" <PASSWORD>)
                                .required(true)
                                .help("The password to log in with"),
                        )
                        .arg(db_arg()),
                )
                .subcommand(
                    command!("list")
                        .about("List all stored credential sets")
                        .arg(db_arg()),
                )
                .subcommand(
                    command!("remove")
                        .about("Remove a stored credential set")
                        .arg(
                            arg!(-i --"id" <ID>)
                                .required(true)
                                .help("The id of the credential set to remove"),
                        )
                        .arg(db_arg()),
                ),
        )
        .subcommand(
            command!("discover")
                .about(
                    "Crawl a site to discover its login and registration form URLs. \
                Stops as soon as both are found.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to start crawling from")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-i --"credentials-id" <ID>)
                        .required(false)
                        .help("Record discovered URLs against this stored credential set"),
                )
                .arg(
                    arg!(--"max-depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link depth from the start URL")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"max-pages" <PAGES>)
                        .required(false)
                        .help("Maximum number of pages to fetch")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2000"),
                )
                .arg(
                    arg!(--"delay" <MILLIS>)
                        .required(false)
                        .help("Delay between requests to the same domain, in milliseconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("2000"),
                )
                .arg(
                    arg!(-c --"concurrency" <NUM>)
                        .required(false)
                        .help("Maximum concurrent requests per domain")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(
                    arg!(--"max-bytes" <BYTES>)
                        .required(false)
                        .help("Maximum response body size to download, in bytes")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1048576"),
                )
                .arg(render_arg())
                .arg(user_agent_arg())
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Emit the outcome as JSON instead of a report")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(db_arg()),
        )
        .subcommand(
            command!("login")
                .about(
                    "Attempt a login at a URL and verify it by watching for newly set \
                cookies.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The login page URL (defaults to the stored discovered URL)")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-n --"username" <USERNAME>)
                        .required(false)
                        .help("The username or email to log in with")
                        .conflicts_with("credentials-id"),
                )
                .arg(
                    arg!(-p --"password" <PASSWORD>)
                        .required(false)
                        .help("The password to log in with")
                        .conflicts_with("credentials-id"),
                )
                .arg(
                    arg!(-i --"credentials-id" <ID>)
                        .required(false)
                        .help("Use a stored credential set and record the attempt"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"screenshot-dir" <PATH>)
                        .required(false)
                        .help("Save a rendered screenshot of the landing page here")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(render_arg())
                .arg(user_agent_arg())
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Emit the attempt report as JSON")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(db_arg()),
        )
}

fn db_arg() -> clap::Arg {
    arg!(--"db" <PATH>)
        .required(false)
        .help("Path to the autologin database")
        .default_value("~/.config/autologin/autologin.db")
}

fn render_arg() -> clap::Arg {
    arg!(--"render" <URL>)
        .required(false)
        .help("Address of a headless rendering service to fetch pages through")
}

fn user_agent_arg() -> clap::Arg {
    arg!(--"user-agent" <STRING>)
        .required(false)
        .help("Override the User-Agent header")
}
