use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::oauth2;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{info, warn};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    read_application_secret,
};

const APP_NAME: &str = "inbox-archiver";
const TOKEN_KEY: &str = "gmail_token";

/// Reading and clearing the unread flag needs the modify scope.
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.modify"];

pub type GmailAuthenticator =
    oauth2::authenticator::Authenticator<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

/// Keeps the OAuth token in the OS keyring.
pub struct RingStorage;

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> Result<()> {
        let entry = Entry::new(APP_NAME, TOKEN_KEY)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        let data = TokenData {
            tokens: vec![token],
        };
        let serialized = serde_json::to_string(&data).context("Failed to serialize tokens")?;

        entry
            .set_password(&serialized)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        match self.get_all().await {
            Ok(data) => data.tokens.into_iter().next(),
            Err(e) => {
                warn!("Could not read stored token: {:#}", e);
                None
            }
        }
    }
}

impl RingStorage {
    async fn get_all(&self) -> Result<TokenData> {
        let entry = Entry::new(APP_NAME, TOKEN_KEY)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        match entry.get_password() {
            Ok(serialized) => {
                serde_json::from_str(&serialized).context("Failed to deserialize tokens")
            }
            Err(keyring::Error::NoEntry) => Ok(TokenData::default()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }

    pub async fn clear_token(&self) -> Result<()> {
        let entry = Entry::new(APP_NAME, TOKEN_KEY)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }
}

/// Opens the consent page in the browser, printing the URL as a fallback.
pub struct BrowserDelegate;

impl InstalledFlowDelegate for BrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            eprintln!("Authorize mailbox access by visiting:\n\n  {}\n", url);
            if let Err(e) = open::that(url) {
                warn!("Could not open browser: {}", e);
            }

            if !need_code {
                return Ok(String::new());
            }

            eprint!("Paste the authorization code: ");
            let mut code = String::new();
            std::io::stdin()
                .read_line(&mut code)
                .map_err(|e| format!("Failed to read authorization code: {}", e))?;
            Ok(code.trim().to_string())
        })
    }
}

pub struct Authenticator;

impl Authenticator {
    pub async fn load_secret<P: AsRef<Path>>(path: P) -> Result<ApplicationSecret> {
        let path = path.as_ref();
        read_application_secret(path)
            .await
            .with_context(|| format!("Failed to read application secret {}", path.display()))
    }

    pub async fn authenticate(secret: ApplicationSecret) -> Result<GmailAuthenticator> {
        let auth = InstalledFlowAuthenticator::builder(
            secret,
            InstalledFlowReturnMethod::HTTPRedirect,
        )
        .with_storage(Box::new(RingStorage))
        .flow_delegate(Box::new(BrowserDelegate))
        .build()
        .await
        .context("Failed to build authenticator")?;

        // Runs the consent flow now if no valid token is stored.
        auth.token(SCOPES)
            .await
            .context("Failed to obtain mailbox access token")?;
        info!("Mailbox authorization ready");

        Ok(auth)
    }
}
