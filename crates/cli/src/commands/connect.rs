use super::{success, Context};
use crate::browser::SystemBrowser;
use crate::callback_server::CallbackServer;
use adsight_connect::{
    CallbackPage, ConnectDriver, ConnectError, MemoryLocation, MessagePort, PendingAuthorization,
    PopupHandle, Settled, POPUP_NAME,
};
use anyhow::Result;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum OperatorInput {
    Reset,
    Redirect(String),
    Ignored,
}

fn classify(line: &str) -> OperatorInput {
    let line = line.trim();
    if line.eq_ignore_ascii_case("reset") || line.eq_ignore_ascii_case("cancel") {
        OperatorInput::Reset
    } else if line.contains("code=") && line.contains("state=") {
        OperatorInput::Redirect(line.to_string())
    } else {
        OperatorInput::Ignored
    }
}

/// Links Google Ads. Returns whether the account ended up connected.
pub async fn run(ctx: &mut Context) -> Result<bool> {
    ctx.require_login().await?;

    let server = CallbackServer::bind(ctx.config.connect.callback_port).await?;
    let origin = server.origin();
    let pending = PendingAuthorization::new();
    let location = MemoryLocation::new();
    let window = PopupHandle::new(POPUP_NAME);
    let mut driver = ConnectDriver::new(
        ctx.config.connect.handshake(&origin),
        pending.clone(),
        SystemBrowser::new(window.clone()),
        location.clone(),
    );
    let port = driver.port();

    let client = &ctx.client;
    let page = CallbackPage::new(client, pending)
        .with_opener(port.clone(), origin.clone())
        .with_missing_state(ctx.config.connect.missing_state_policy());

    println!("{}", "Connecting Google Ads".bold());
    println!("Finish signing in with Google in your browser.");
    println!(
        "{}",
        "If the redirect does not return here, paste the full redirect URL. Type `reset` to cancel.".dimmed()
    );

    let done = CancellationToken::new();

    let handshake = async {
        let result = driver.connect(client, client).await;
        done.cancel();
        result
    };

    let listener = async {
        tokio::select! {
            _ = done.cancelled() => {}
            served = server.serve_once(&page) => {
                match served {
                    Ok(Ok(_)) => debug!("Callback page finished"),
                    Ok(Err(e)) => debug!("Callback page reported: {e}"),
                    Err(e) => warn!("Callback listener failed: {e:#}"),
                }
                // The browser tab has shown its final page.
                window.close();
            }
        }
    };

    let console = &mut ctx.console;
    let operator = async {
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = tokio::signal::ctrl_c() => {
                    port.teardown();
                }
                line = console.next_line() => match line {
                    None => break,
                    Some(line) => forward(&classify(&line), &port, &location),
                },
            }
        }
    };

    let (result, (), ()) = tokio::join!(handshake, listener, operator);

    match result {
        Ok(Settled::Connected(_)) => {
            success("Google Ads connected");
            Ok(true)
        }
        Ok(Settled::Reset) => {
            println!("Connection reset.");
            Ok(false)
        }
        Err(ConnectError::Unauthenticated) => Err(ConnectError::Unauthenticated.into()),
        Err(e) => {
            eprintln!("{} {e}", "✗".red().bold());
            if e.is_retryable() {
                println!("Run `adsight connect` to try again.");
            }
            Ok(false)
        }
    }
}

fn forward(input: &OperatorInput, port: &MessagePort, location: &MemoryLocation) {
    match input {
        OperatorInput::Reset => {
            port.reset();
        }
        OperatorInput::Redirect(url) => location.set_url(url.clone()),
        OperatorInput::Ignored => {}
    }
}
