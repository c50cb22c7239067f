use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};

use vigil::cli::Args;
use vigil::fetch::FetchClient;
use vigil::reporter;
use vigil::scanner::ScanOrchestrator;

fn display_banner(target_url: &str) {
    let user = whoami::username();
    let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());

    println!();
    println!("    \x1b[38;5;51m██╗   ██╗\x1b[38;5;45m██╗\x1b[38;5;39m ██████╗ \x1b[38;5;33m██╗\x1b[38;5;27m██╗     \x1b[0m");
    println!("    \x1b[38;5;51m██║   ██║\x1b[38;5;45m██║\x1b[38;5;39m██╔════╝ \x1b[38;5;33m██║\x1b[38;5;27m██║     \x1b[0m");
    println!("    \x1b[38;5;51m██║   ██║\x1b[38;5;45m██║\x1b[38;5;39m██║  ███╗\x1b[38;5;33m██║\x1b[38;5;27m██║     \x1b[0m");
    println!("    \x1b[38;5;51m╚██╗ ██╔╝\x1b[38;5;45m██║\x1b[38;5;39m██║   ██║\x1b[38;5;33m██║\x1b[38;5;27m██║     \x1b[0m");
    println!("    \x1b[38;5;51m ╚████╔╝ \x1b[38;5;45m██║\x1b[38;5;39m╚██████╔╝\x1b[38;5;33m██║\x1b[38;5;27m███████╗\x1b[0m");
    println!("    \x1b[38;5;51m  ╚═══╝  \x1b[38;5;45m╚═╝\x1b[38;5;39m ╚═════╝ \x1b[38;5;33m╚═╝\x1b[38;5;27m╚══════╝\x1b[0m");
    println!();
    println!("         \x1b[3;38;5;147m\"Find it before they do\"\x1b[0m");
    println!();
    println!("    \x1b[38;5;240m├─\x1b[0m Operator: \x1b[1;37m{user}@{host}\x1b[0m");
    println!("    \x1b[38;5;240m├─\x1b[0m Target:   \x1b[1;37m{target_url}\x1b[0m");
    println!(
        "    \x1b[38;5;240m└─\x1b[0m Version:  \x1b[1;37mv{}\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet flags
    let log_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    if !args.quiet {
        display_banner(&args.url);
    }

    let target = args.to_target()?;
    log::info!("Vigil starting against {} ({})", target.url, args.mode);

    let client = Arc::new(FetchClient::new(
        Duration::from_secs(target.timeout_secs),
        target.cookies.clone(),
        target.headers.clone(),
    )?);
    let orchestrator = ScanOrchestrator::new(client);

    let spinner = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("    {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Scanning {}", target.url));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let verdict = orchestrator.scan(&target).await?;
    spinner.finish_and_clear();

    let report = reporter::build_report(&verdict, &target);
    let path = reporter::write_report(&report, &args.output)?;

    if !args.quiet {
        let critical = report
            .findings_breakdown
            .by_risk_level
            .get("CRITICAL")
            .copied()
            .unwrap_or(0);
        let (icon, color) = if critical > 0 {
            ("⚠", "\x1b[38;5;196m")
        } else {
            ("✓", "\x1b[38;5;46m")
        };

        println!("    \x1b[38;5;46m▶\x1b[0m \x1b[1;37mScan completed\x1b[0m \x1b[38;5;46m✓\x1b[0m");
        println!(
            "    \x1b[38;5;240m├─\x1b[0m Pages scanned:  \x1b[1;37m{}\x1b[0m",
            verdict.total_pages_scanned
        );
        println!(
            "    \x1b[38;5;240m├─\x1b[0m Findings:       \x1b[1;37m{}\x1b[0m",
            verdict.findings.len()
        );
        println!(
            "    \x1b[38;5;240m├─\x1b[0m Overall risk:   \x1b[1;37m{}\x1b[0m (score {:.1})",
            verdict.overall_risk_level, verdict.vulnerability_score
        );
        println!(
            "    \x1b[38;5;240m├─\x1b[0m Critical:       {color}{icon}\x1b[0m \x1b[1;37m{critical}\x1b[0m"
        );
        println!(
            "    \x1b[38;5;240m└─\x1b[0m Report:         \x1b[1;37m{}\x1b[0m",
            path.display()
        );
        println!();
    }

    Ok(())
}
