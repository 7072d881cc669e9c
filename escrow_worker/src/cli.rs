use std::{env, env::VarError};

/// The worker takes no arguments. Passing any prints the help text and the current configuration, and returns true.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Only non-secret values. The MoneroPay URL may carry credentials, so it is left out.
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "ESC_HOST",
        "ESC_PORT",
        "ESC_DATABASE_URL",
        "ESC_RUN_MIGRATIONS",
        "ESC_MONEROPAY_CALLBACK_URL",
        "ESC_PROVIDER_TIMEOUT_SECS",
        "ESC_PRICE_FEED_URL",
        "ESC_PRICE_FEED_PROXY",
        "ESC_PRICE_FEED_INTERVAL_MINS",
        "ESC_INVOICE_PAYMENT_WINDOW_HRS",
        "ESC_ORDER_PROCESSING_WINDOW_HRS",
        "ESC_ORDER_DISPATCH_WINDOW_HRS",
        "ESC_ORDER_DELIVERY_WINDOW_HRS",
        "ESC_EXTEND_UNAVAILABLE_WINDOW_HRS",
    ];

    println!("Current environment values (EXCLUDING variables that may contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
