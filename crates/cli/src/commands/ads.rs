use super::{success, Context};
use anyhow::Result;
use colored::Colorize;

pub async fn summary(ctx: &Context) -> Result<()> {
    ctx.require_login().await?;
    let summary = ctx.client.account_summary().await?;

    println!("{}", "Account summary".bold());
    println!("  Connected accounts: {}", summary.connected_accounts);
    println!("  Active campaigns:   {}", summary.active_campaigns);
    println!("  Monthly spend:      ${:.2}", summary.monthly_spend);
    if !summary.message.is_empty() {
        println!("  {}", summary.message.dimmed());
    }
    Ok(())
}

pub async fn sync(ctx: &Context, weeks: u32) -> Result<()> {
    ctx.require_login().await?;
    println!("Syncing the last {weeks} week(s) of Google Ads data...");

    let data = ctx.client.sync_google_ads(weeks).await?;
    success("Sync complete");
    if !data.is_null() {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}
