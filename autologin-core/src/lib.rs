use colored::Colorize;

pub mod data;
pub mod discover;
pub mod login_run;

pub fn print_banner() {
    let banner = r#"
   ┌─┐┬ ┬┌┬┐┌─┐┬  ┌─┐┌─┐┬┌┐┌
   ├─┤│ │ │ │ ││  │ ││ ┬││││
   ┴ ┴└─┘ ┴ └─┘┴─┘└─┘└─┘┴┘└┘
"#;
    println!("{}", banner.cyan());
    println!(
        "   {} {}",
        "login form discovery and credential testing".dimmed(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!();
}
