// src/config.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};

use crate::{
    common::i18n::I18nStore,
    db::{AdministrativeRepository, ContractRepository, OrgRepository, ProjectRepository},
    services::{
        administrative_service::AdministrativeService, contract_service::ContractService,
        org_service::OrgService, project_service::ProjectService,
    },
};

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// ---
// Configuração (variáveis de ambiente)
// ---
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub db_max_connections: u32,
}

impl Config {
    /// Lê o `.env` (se existir) e depois o ambiente do processo.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS inválido: '{}'", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self { database_url, jwt_secret, server_addr, db_max_connections })
    }
}

// ---
// Estado compartilhado
// ---
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Config,
    pub i18n_store: I18nStore,
    pub org_repo: OrgRepository,
    pub administrative_service: AdministrativeService,
    pub contract_service: ContractService,
    pub project_service: ProjectService,
    pub org_service: OrgService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Self::from_parts(db_pool, config)
    }

    /// Monta o gráfico de dependências em cima de uma pool já criada.
    pub fn from_parts(db_pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let i18n_store = I18nStore::load()?;

        let org_repo = OrgRepository::new(db_pool.clone());
        let administrative_repo = AdministrativeRepository::new();
        let project_repo = ProjectRepository::new();

        let contract_service = ContractService::new(
            ContractRepository::new(),
            administrative_repo.clone(),
            org_repo.clone(),
        );
        let administrative_service = AdministrativeService::new(
            administrative_repo,
            org_repo.clone(),
            project_repo.clone(),
        );
        let project_service = ProjectService::new(project_repo);
        let org_service = OrgService::new(org_repo.clone());

        Ok(Self {
            db_pool,
            config,
            i18n_store,
            org_repo,
            administrative_service,
            contract_service,
            project_service,
            org_service,
        })
    }
}
