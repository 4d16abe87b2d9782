use anyhow::{Context, Result};
use clap::Parser;
use product_stream::logging::init_logging;
use product_stream::{
    AnalysisClient, AnalysisSession, Cli, EnrichedRecord, ResultSet, StreamEnd, StreamEvent,
};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let controls = cli.build_controls();
    let context = cli.build_context().context("invalid analysis endpoint")?;
    let request = cli.build_request().context("invalid analysis input")?;
    let client = AnalysisClient::new(controls.connect_timeout())
        .context("failed to build analysis HTTP client")?;

    let mut session = AnalysisSession::new(client, context, controls.policy());
    let mut analysis = session.start(request);

    let deadline = controls
        .read_timeout()
        .map(|timeout| analysis.cancel_handle().cancel_after(timeout));
    let interrupt = {
        let cancel = analysis.cancel_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    while let Some(event) = analysis.next_event().await {
        match event {
            StreamEvent::Snapshot(snapshot) => render_snapshot(&snapshot, cli.json)?,
            StreamEvent::Completed => {}
            StreamEvent::Failed { kind, message } => {
                warn!(?kind, %message, "analysis failed");
                session.record_failure(kind);
            }
        }
    }

    let outcome = analysis.join().await;
    interrupt.abort();
    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let summary = outcome.context("analysis stream failed")?;
    if !cli.json {
        println!("--- analysis summary ---");
        match summary.end {
            StreamEnd::Completed => println!("status: complete"),
            StreamEnd::Cancelled => println!("status: cancelled"),
        }
        match &summary.snapshot {
            Some(snapshot) => {
                println!("products: {}", snapshot.len());
                if let Some(best) = snapshot.recommended() {
                    println!("top recommendation: {}", describe(best));
                }
            }
            None => println!("products: 0 (no matches)"),
        }
        println!("malformed records skipped: {}", summary.stats.malformed);
        println!("duplicates dropped: {}", summary.stats.duplicates);
    }
    Ok(())
}

fn render_snapshot(snapshot: &ResultSet, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;
        println!("{line}");
        return Ok(());
    }
    if let Some(latest) = snapshot.products().last() {
        println!("{}", describe(latest));
    }
    Ok(())
}

fn describe(product: &EnrichedRecord) -> String {
    let marker = if product.is_recommended { " *" } else { "" };
    format!(
        "[{}] {} ({}) score {:.0}/100{marker}",
        product.id,
        product.display_name(),
        product.price,
        product.score
    )
}
