use anyhow::Context;
use std::env;

pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub master_secret: String,
    pub token_endpoint: String,
    pub token_scope: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://token_hub.db".into());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3030".into());
        // Key source for credential encryption. A changed secret cannot decrypt
        // previously stored credentials; accounts must be re-imported.
        let master_secret =
            env::var("HUB_MASTER_SECRET").context("HUB_MASTER_SECRET must be set")?;
        let token_endpoint = env::var("TOKEN_ENDPOINT").unwrap_or_else(|_| {
            "https://login.microsoftonline.com/consumers/oauth2/v2.0/token".into()
        });
        let token_scope = env::var("TOKEN_SCOPE").unwrap_or_else(|_| {
            "https://outlook.office.com/IMAP.AccessAsUser.All offline_access".into()
        });

        Ok(Config {
            database_url,
            bind_addr,
            master_secret,
            token_endpoint,
            token_scope,
        })
    }
}
