use clap::{Arg, Command};
use log::LevelFilter;
use phish_verdict::notification::NotificationDispatcher;
use phish_verdict::{
    CancelSignal, Config, MessageInput, PhishingAnalyzer, Verdict, VerdictRequest,
    VerdictResponse,
};
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("phish-verdict")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing risk analysis for email messages")
        .long_about("phish-verdict scores an email for phishing risk:\n\
                    • Subject, body, link and sender signals run concurrently\n\
                    • Weighted aggregation into a safe/suspicious/dangerous/critical verdict\n\
                    • Actionable insights and per-user alert notifications")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phish-verdict.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity and list the signal sources it builds")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Analyze an RFC 822 email file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .value_name("ID")
                .help("User the notification belongs to (defaults to the recipient)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("notify")
                .long("notify")
                .help("Record an alert notification when the verdict is not safe")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the verdict as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-signal scores")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/phish-verdict.yaml");
    let config_found = Path::new(config_path).exists();

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config.log_level()
    };

    // RUST_LOG, when set, takes precedence over the configured level
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    if !config_found {
        log::warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    if let Some(email_file) = matches.get_one::<String>("test-email") {
        let request_user = matches.get_one::<String>("user").cloned();
        let options = OutputOptions {
            notify: matches.get_flag("notify"),
            json: matches.get_flag("json"),
        };
        test_email_file(&config, email_file, request_user, options).await;
        return;
    }

    eprintln!("Nothing to do: use --test-email FILE, --test-config or --generate-config FILE");
    process::exit(2);
}

struct OutputOptions {
    notify: bool,
    json: bool,
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();

    let analyzer = match PhishingAnalyzer::from_config(config) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            println!("❌ Configuration validation failed:");
            println!("Error: {e}");
            process::exit(1);
        }
    };

    println!(
        "Signal adapter timeout: {}ms",
        config.analysis.adapter_timeout_ms
    );
    println!("Signal sources:");
    for name in analyzer.source_names() {
        println!("  - {name}");
    }
    println!(
        "Pattern counts: subject={}, content={}",
        config.heuristics.subject.patterns.len(),
        config.heuristics.content.patterns.len()
    );
    println!(
        "Notifications: page size {}, log alerts {}",
        config.notifications.default_page_size,
        if config.notifications.log_alerts { "on" } else { "off" }
    );
    println!("✅ Configuration is valid");
}

fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

async fn test_email_file(
    config: &Config,
    email_file: &str,
    user_id: Option<String>,
    options: OutputOptions,
) {
    let source = match std::fs::read_to_string(email_file) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("❌ Error reading email file: {e}");
            process::exit(1);
        }
    };

    let analyzer = match PhishingAnalyzer::from_config(config) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            process::exit(1);
        }
    };

    let message = MessageInput::from_rfc822(&source);

    if !options.json {
        println!("🧪 Testing email file: {email_file}");
        println!();
        println!("📧 Email Details:");
        println!("   Sender: {}", message.sender);
        println!("   Recipient: {}", message.recipient);
        println!("   Subject: {}", truncate_string(&message.subject, 100));
        println!();
    }

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("Interrupted, returning partial verdict");
        on_interrupt.cancel();
    }) {
        log::warn!("Could not install Ctrl-C handler: {e}");
    }

    let mut request = VerdictRequest::new(message).notify(options.notify);
    request.user_id = user_id;

    let response = match analyzer.analyze(request, Some(&cancel)).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    if options.json {
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("❌ Error serializing verdict: {e}");
                process::exit(1);
            }
        }
        return;
    }

    print_verdict(&response);
    if response.notification.sent {
        print_notifications(
            analyzer.dispatcher(),
            response.notification.notification_id.as_deref(),
            config.notifications.default_page_size,
        );
    }
}

fn print_verdict(response: &VerdictResponse) {
    let result = &response.result;
    let icon = match result.verdict {
        Verdict::Safe => "✅",
        Verdict::Suspicious => "⚠️ ",
        Verdict::Dangerous => "❌",
        Verdict::Critical => "🚨",
    };

    println!(
        "{icon} Result: {} (risk score {:.1})",
        result.verdict.as_str().to_uppercase(),
        result.risk_score
    );
    println!("   {}", result.description);
    println!("   Recommended action: {}", result.recommended_action);
    println!();

    println!("🔍 Evidence:");
    for evidence in &result.evidence {
        let status = if evidence.available { "" } else { " [unavailable]" };
        println!(
            "   - {:<8} score {:.2} weight {:.2}{status}: {}",
            evidence.kind.as_str(),
            evidence.score,
            evidence.weight,
            truncate_string(&evidence.description, 120)
        );
        for url in &evidence.suspicious_urls {
            println!("       suspicious URL: {url}");
        }
    }
    println!();

    println!("💡 Insights:");
    for insight in &result.insights {
        println!("   - [{:?}] {}", insight.kind, insight.message);
    }
    println!();

    match (&response.notification.notification_id, &response.notification.reason) {
        (Some(id), _) => println!("📬 Notification sent: {id}"),
        (None, Some(reason)) => println!("📭 No notification: {reason}"),
        (None, None) => println!("📭 No notification"),
    }
}

fn print_notifications(dispatcher: &NotificationDispatcher, sent_id: Option<&str>, page_size: usize) {
    let Some(owner) = sent_id
        .and_then(|id| dispatcher.get(id).ok())
        .map(|record| record.user_id)
    else {
        return;
    };

    let page = dispatcher.list_notifications(&owner, page_size, 0);
    println!();
    println!("🔔 Notifications for {} ({} of {}):", page.user_id, page.count, page.total);
    for record in &page.notifications {
        println!(
            "   {} {} {:<10} {:.1} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if record.read { " " } else { "*" },
            record.verdict.as_str(),
            record.risk_score,
            truncate_string(&record.subject, 60)
        );
    }
}
