//! Example: Customizing site markers for a different login page.
//!
//! The default markers target an Ant Design login form; this example shows
//! how to override the selectors and classification keywords for another
//! site, and how to adjust the verification settings to match its emails.
//!
//! # Usage
//!
//! ```bash
//! export LOGIN_URL="https://example.com/login"
//! export SITE_USERNAME="your-username"
//! export SITE_PASSWORD="your-password"
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example custom_markers
//! ```

use login_sync::{
    LoginConfig, LoginOrchestrator, MailboxConfig, SiteMarkers, VerificationSettings,
};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> login_sync::Result<()> {
    let login_url = env::var("LOGIN_URL").expect("LOGIN_URL environment variable required");
    let username = env::var("SITE_USERNAME").expect("SITE_USERNAME environment variable required");
    let password = env::var("SITE_PASSWORD").expect("SITE_PASSWORD environment variable required");
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let mail_password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    // Start from the defaults and override what differs on this site
    let mut markers = SiteMarkers::default();
    markers.username_field = "input[name='login']".into();
    markers.password_field = "input[name='passwd']".into();
    markers.submit_button = "#signin-button".into();
    markers.code_field = "input[autocomplete='one-time-code']".into();
    markers.send_code_texts = vec!["Send code".into(), "Resend".into()];
    markers.success_selectors = vec!["a[href='/signout']".into()];
    markers.success_url_keywords = vec!["account".into(), "overview".into()];

    let mailbox = MailboxConfig::builder()
        .email(&email)
        .password(mail_password)
        .build()?;

    let config = LoginConfig::builder()
        .login_url(&login_url)
        .username(username)
        .password(password)
        .mailbox(mailbox)
        // Match this site's code emails: 8 digits from a known sender
        .verification(VerificationSettings {
            deadline: Duration::from_secs(180),
            sender_pattern: Some("no-reply@example.com".into()),
            subject_pattern: Some("sign-in code".into()),
            code_digits: 8,
        })
        .build()?;

    let mut orchestrator = LoginOrchestrator::launch_with_markers(config, markers).await?;
    let outcome = orchestrator.run().await?;

    println!("Login finished: {}", outcome);

    Ok(())
}
