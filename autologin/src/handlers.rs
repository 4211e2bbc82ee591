use autologin_core::data::{CredentialStore, Database};
use autologin_core::discover::{execute_discovery, generate_discovery_report, DiscoverOptions};
use autologin_core::login_run::{execute_login, LoginOptions};
use autologin_scanner::discovery::DiscoveryStore;
use autologin_scanner::fetch::DEFAULT_USER_AGENT;
use autologin_scanner::frontier::CrawlBudget;
use autologin_scanner::login::LoginReport;
use clap::ArgMatches;
use colored::Colorize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// Helper functions shared by the handlers

/// Expand `~` in a database path argument
pub fn expand_db_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Choose the URL a login attempt should start at. An explicit --url wins,
/// then a previously discovered login URL, then the site URL the credentials
/// were stored for.
pub fn resolve_login_target(
    url_flag: Option<&str>,
    discovered_login_url: Option<&str>,
    target_url: Option<&str>,
) -> Result<String, String> {
    url_flag
        .or(discovered_login_url)
        .or(target_url)
        .map(|s| s.to_string())
        .ok_or_else(|| {
            "No login URL available. Pass --url or run `autologin discover` first.".to_string()
        })
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> String {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush().unwrap();
    let mut response = String::new();
    io::stdin().read_line(&mut response).unwrap();
    response.trim().to_lowercase()
}

fn open_database(args: &ArgMatches) -> Database {
    let raw = args.get_one::<String>("db").unwrap();
    let db_path = expand_db_path(raw);
    if !Database::exists(&db_path) {
        eprintln!(
            "✗ No database at {}. Run `autologin init` first.",
            db_path.display()
        );
        std::process::exit(1);
    }
    match Database::new(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("✗ Failed to open database: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn handle_init(args: &ArgMatches) {
    print_divider();
    println!("{}", "  AUTOLOGIN INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir_arg = args.get_one::<String>("PATH").unwrap();
    let force = args.get_flag("force");
    let expanded_config_dir = shellexpand::tilde(dir_arg);
    let config_dir = PathBuf::from(expanded_config_dir.as_ref());
    let db_path = config_dir.join("autologin.db");

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    // Handle existing database
    if Database::exists(&db_path) {
        if force {
            println!(
                "{} Deleting existing database (force mode)",
                "→".yellow().bold()
            );
            Database::drop(&db_path);
            println!("{} Existing database removed", "✓".green().bold());
            println!();
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();

            let response = print_prompt("Would you like to overwrite it? [y/N]:");
            println!();

            if response != "y" && response != "yes" {
                println!("{} Keeping existing database", "→".blue());
                println!();
                return;
            }
            Database::drop(&db_path);
            println!("{} Existing database removed", "✓".green().bold());
            println!();
        }
    }

    println!("{} Creating directory structure...", "→".blue());
    std::fs::create_dir_all(&config_dir).expect("Failed to create config directory");
    println!(
        "  {} {}",
        "✓".green(),
        config_dir.display().to_string().bright_white()
    );

    println!("{} Creating database...", "→".blue());
    Database::new(&db_path).expect("Failed to create database");
    println!(
        "{} Database initialized: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
}

pub fn handle_credentials_add(args: &ArgMatches) {
    let url = args.get_one::<Url>("url").unwrap();
    let username = args.get_one::<String>("username").unwrap();
    let password = args.get_one::<String>("password").unwrap();
    let db = open_database(args);

    match db.add_credentials(url.as_str(), username, password) {
        Ok(id) => {
            println!("{} Stored credentials for {}", "✓".green().bold(), url);
            println!("  {} id: {}", "•".blue(), id.bright_white());
        }
        Err(e) => {
            eprintln!("✗ Failed to store credentials: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn handle_credentials_list(args: &ArgMatches) {
    let db = open_database(args);

    let all = match db.list_credentials() {
        Ok(all) => all,
        Err(e) => {
            eprintln!("✗ Failed to list credentials: {}", e);
            std::process::exit(1);
        }
    };

    if all.is_empty() {
        println!("No stored credentials.");
        return;
    }

    for creds in all {
        println!(
            "{} {}",
            creds.id.bright_white().bold(),
            creds.target_url.cyan()
        );
        println!("    username: {}", creds.username);
        if let Some(login_url) = &creds.login_url {
            println!("    login form: {}", login_url.green());
        }
        if let Some(registration_url) = &creds.registration_url {
            println!("    registration form: {}", registration_url.green());
        }
    }
}

pub fn handle_credentials_remove(args: &ArgMatches) {
    let id = args.get_one::<String>("id").unwrap();
    let db = open_database(args);

    match db.delete_credentials(id) {
        Ok(true) => println!("{} Removed credentials {}", "✓".green().bold(), id),
        Ok(false) => {
            eprintln!("✗ No credentials with id {}", id);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("✗ Failed to remove credentials: {}", e);
            std::process::exit(1);
        }
    }
}

pub async fn handle_discover(args: &ArgMatches) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let url = args.get_one::<Url>("url").unwrap();
    let json_output = args.get_flag("json");

    let budget = CrawlBudget {
        max_depth: *args.get_one::<usize>("max-depth").unwrap(),
        max_pages: *args.get_one::<usize>("max-pages").unwrap(),
        delay_per_request: Duration::from_millis(*args.get_one::<u64>("delay").unwrap()),
        max_concurrent_per_domain: *args.get_one::<usize>("concurrency").unwrap(),
        max_response_bytes: *args.get_one::<usize>("max-bytes").unwrap(),
    };

    let mut options = DiscoverOptions::new(url.as_str());
    options.budget = budget;
    options.show_progress = !json_output;
    options.render_service = args.get_one::<String>("render").cloned();
    if let Some(ua) = args.get_one::<String>("user-agent") {
        options.user_agent = ua.clone();
    }

    // Wire discovered URLs into the database when a credential set is named
    let store: Option<Arc<dyn DiscoveryStore>> =
        args.get_one::<String>("credentials-id").map(|id| {
            let db = open_database(args);
            match db.get_credentials(id) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    eprintln!("✗ No credentials with id {}", id);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("✗ Failed to look up credentials: {}", e);
                    std::process::exit(1);
                }
            }
            Arc::new(CredentialStore::new(db, id)) as Arc<dyn DiscoveryStore>
        });

    let outcome = match execute_discovery(options, store).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("✗ Discovery failed: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        let value = serde_json::json!({
            "seed_url": url.as_str(),
            "login_url": outcome.login_url,
            "registration_url": outcome.registration_url,
            "pages_fetched": outcome.pages_fetched,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap());
    } else {
        println!("\n✓ Discovery complete!\n");
        print!("{}", generate_discovery_report(url.as_str(), &outcome));
    }
}

pub async fn handle_login(args: &ArgMatches) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let url_flag = args.get_one::<Url>("url").map(|u| u.to_string());
    let credentials_id = args.get_one::<String>("credentials-id").cloned();
    let json_output = args.get_flag("json");

    // Resolve the target URL and the credentials to submit
    let (start_url, username, password, db) = match &credentials_id {
        Some(id) => {
            let db = open_database(args);
            let creds = match db.get_credentials(id) {
                Ok(Some(creds)) => creds,
                Ok(None) => {
                    eprintln!("✗ No credentials with id {}", id);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("✗ Failed to look up credentials: {}", e);
                    std::process::exit(1);
                }
            };
            let target = match resolve_login_target(
                url_flag.as_deref(),
                creds.login_url.as_deref(),
                Some(&creds.target_url),
            ) {
                Ok(target) => target,
                Err(e) => {
                    eprintln!("✗ {}", e);
                    std::process::exit(1);
                }
            };
            (target, creds.username, creds.password, Some(db))
        }
        None => {
            let url = match &url_flag {
                Some(url) => url.clone(),
                None => {
                    eprintln!("✗ Either --url or --credentials-id must be provided");
                    std::process::exit(1);
                }
            };
            let username = match args.get_one::<String>("username") {
                Some(username) => username.clone(),
                None => {
                    eprintln!("✗ --username is required without --credentials-id");
                    std::process::exit(1);
                }
            };
            let password = match args.get_one::<String>("password") {
                Some(password) => password.clone(),
                None => {
                    eprintln!("✗ --password is required without --credentials-id");
                    std::process::exit(1);
                }
            };
            (url, username, password, None)
        }
    };

    let mut options = LoginOptions::new(&start_url, &username, &password);
    options.timeout = Duration::from_secs(*args.get_one::<u64>("timeout").unwrap());
    options.render_service = args.get_one::<String>("render").cloned();
    options.screenshot_dir = args.get_one::<PathBuf>("screenshot-dir").cloned();
    if let Some(ua) = args.get_one::<String>("user-agent") {
        options.user_agent = ua.clone();
    }

    let report = match execute_login(options).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("✗ Login attempt failed: {}", e);
            std::process::exit(1);
        }
    };

    // Log the attempt against the credential set it came from
    if let (Some(db), Some(id)) = (&db, &credentials_id)
        && let Err(e) = db.record_login_attempt(id, &report)
    {
        eprintln!("⚠️  Failed to record login attempt: {}", e);
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report).unwrap());
    } else {
        print_login_summary(&start_url, &report);
    }
}

fn print_login_summary(start_url: &str, report: &LoginReport) {
    println!();
    if report.ok {
        println!("{} Login succeeded at {}", "✓".green().bold(), start_url);
        if let Some(cookies) = &report.cookies {
            println!("  Session cookies:");
            for cookie in cookies {
                println!("    {} {}={}", "•".blue(), cookie.name.bright_white(), cookie.value);
            }
        }
    } else {
        let reason = report.error.as_deref().unwrap_or("unknown");
        println!(
            "{} Login failed at {} ({})",
            "✗".red().bold(),
            start_url,
            reason.yellow()
        );
    }
}
