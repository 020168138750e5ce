use super::{account, connect, login_required, report_error, Context};
use crate::onboarding::{OnboardingScreen, OnboardingState, Platform};
use anyhow::Result;
use colored::Colorize;

pub async fn run(ctx: &mut Context) -> Result<()> {
    let mut state = OnboardingState::new();

    loop {
        match state.current_screen {
            OnboardingScreen::Welcome => {
                println!("{}", "Welcome to AdSight".bold());
                println!("Connect your ad accounts to get AI-powered campaign insights.");
                if !ctx.client.credentials().is_authenticated().await {
                    if ctx.console.confirm("Do you already have an account?", true).await? {
                        account::login(ctx, None).await?;
                    } else {
                        account::signup(ctx).await?;
                    }
                }
                state.google_ads_connected = ctx.client.validate_google_connection().await.connected;
                state.next_screen();
            }
            OnboardingScreen::ConnectAccounts => {
                println!();
                println!("{}", "Connect your accounts".bold());
                for platform in Platform::ALL {
                    let status = if state.is_connected(platform) {
                        "connected".green()
                    } else if platform.is_available() {
                        "not connected".yellow()
                    } else {
                        "not yet available".dimmed()
                    };
                    println!("  {:<10} {status}", platform.label());
                }

                if state.next_screen() {
                    continue;
                }
                if let Some(message) = &state.error_message {
                    println!("{}", message.yellow());
                }
                if !ctx.console.confirm("Connect Google Ads now?", true).await? {
                    println!("You can finish later with `adsight onboard`.");
                    return Ok(());
                }
                match connect::run(ctx).await {
                    Ok(connected) => state.google_ads_connected = connected,
                    Err(e) if login_required(&e).is_some() => return Err(e),
                    Err(e) => report_error("Connection failed", &e),
                }
            }
            OnboardingScreen::Complete => {
                println!();
                println!("{}", "You're all set!".green().bold());
                println!("Try `adsight summary` or `adsight chat`.");
                return Ok(());
            }
        }
    }
}
