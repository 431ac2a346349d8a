//! Example: Routing the run through SOCKS5 proxies.
//!
//! The browser and the IMAP connection proxy independently: the browser takes
//! a `--proxy-server` style URL, the mailbox poller a [`Socks5Proxy`] with
//! optional authentication.
//!
//! # Usage
//!
//! ```bash
//! export LOGIN_URL="https://example.com/login"
//! export SITE_USERNAME="your-username"
//! export SITE_PASSWORD="your-password"
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! export PROXY_HOST="proxy.example.com"
//! export PROXY_PORT="1080"
//! # Optional proxy authentication
//! export PROXY_USER="proxyuser"
//! export PROXY_PASS="proxypass"
//! cargo run --example with_proxy
//! ```

use login_sync::{LoginConfig, LoginOrchestrator, MailboxConfig, Socks5Proxy};
use std::env;

#[tokio::main]
async fn main() -> login_sync::Result<()> {
    let login_url = env::var("LOGIN_URL").expect("LOGIN_URL environment variable required");
    let username = env::var("SITE_USERNAME").expect("SITE_USERNAME environment variable required");
    let password = env::var("SITE_PASSWORD").expect("SITE_PASSWORD environment variable required");
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let mail_password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");
    let proxy_host = env::var("PROXY_HOST").expect("PROXY_HOST environment variable required");
    let proxy_port: u16 = env::var("PROXY_PORT")
        .expect("PROXY_PORT environment variable required")
        .parse()
        .expect("PROXY_PORT must be a valid port number");

    // Proxy auth is optional
    let imap_proxy = match (env::var("PROXY_USER"), env::var("PROXY_PASS")) {
        (Ok(user), Ok(pass)) => {
            println!(
                "Using authenticated SOCKS5 proxy {}:{}",
                proxy_host, proxy_port
            );
            Socks5Proxy::with_auth(&proxy_host, proxy_port, user, pass)
        }
        _ => {
            println!("Using SOCKS5 proxy {}:{}", proxy_host, proxy_port);
            Socks5Proxy::new(&proxy_host, proxy_port)
        }
    };

    let mailbox = MailboxConfig::builder()
        .email(&email)
        .password(mail_password)
        .proxy(imap_proxy)
        .build()?;

    let config = LoginConfig::builder()
        .login_url(&login_url)
        .username(username)
        .password(password)
        .mailbox(mailbox)
        // The browser proxies separately
        .browser_proxy(format!("socks5://{}:{}", proxy_host, proxy_port))
        .build()?;

    let mut orchestrator = LoginOrchestrator::launch(config).await?;
    let outcome = orchestrator.run().await?;

    println!("Login finished: {}", outcome);

    Ok(())
}
