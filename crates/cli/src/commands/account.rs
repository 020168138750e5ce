use super::{success, Context};
use adsight_api::{SignupForm, User};
use anyhow::Result;
use colored::Colorize;

pub async fn signup(ctx: &mut Context) -> Result<User> {
    println!("{}", "Create your account".bold());
    let first_name = ctx.console.text_required("First name").await?;
    let last_name = ctx.console.text_required("Last name").await?;
    let email = ctx.console.text_required("Email").await?;
    let company = ctx.console.text("Company").await?;
    let password = ctx.console.new_password().await?;

    let form = SignupForm {
        first_name,
        last_name,
        email,
        password,
        company,
    };
    let user = ctx.client.signup(&form).await?;
    success(&format!("Welcome, {}!", user.name));
    Ok(user)
}

pub async fn login(ctx: &mut Context, email: Option<String>) -> Result<User> {
    let email = match email {
        Some(email) => email,
        None => ctx.console.text_required("Email").await?,
    };
    let password = ctx.console.password("Password").await?;

    let user = ctx.client.login(&email, &password).await?;
    success(&format!("Logged in as {} <{}>", user.name, user.email));
    Ok(user)
}

pub async fn logout(ctx: &Context) -> Result<()> {
    ctx.client.logout().await?;
    success("Logged out");
    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    let Some(user) = ctx.client.credentials().user().await else {
        println!("Not logged in. Run `adsight login` or `adsight signup`.");
        return Ok(());
    };
    println!("{} {} <{}>", "User:".bold(), user.name, user.email);

    let report = ctx.client.validate_google_connection().await;
    let state = if report.connected {
        "connected".green()
    } else {
        "not connected".yellow()
    };
    println!("{} {state}", "Google Ads:".bold());
    if let Some(message) = report.message.filter(|m| !m.is_empty()) {
        println!("  {message}");
    }
    println!("{} {}", "Meta Ads:".bold(), "not yet available".dimmed());
    Ok(())
}
