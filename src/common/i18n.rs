// src/common/i18n.rs

use std::{collections::HashMap, sync::Arc};

// Catálogos embutidos no binário (não dependem do diretório de execução)
const CATALOGS: &[(&str, &str)] = &[
    ("fr", include_str!("../../locales/fr.json")),
    ("en", include_str!("../../locales/en.json")),
];

pub const DEFAULT_LOCALE: &str = "fr";

/// Mensagens traduzidas por idioma, indexadas pela chave da mensagem.
#[derive(Debug, Clone)]
pub struct I18nStore {
    catalogs: Arc<HashMap<String, HashMap<String, String>>>,
}

impl I18nStore {
    pub fn load() -> anyhow::Result<Self> {
        let mut catalogs = HashMap::new();
        for (lang, raw) in CATALOGS {
            let messages: HashMap<String, String> = serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("Catálogo '{}' inválido: {}", lang, e))?;
            catalogs.insert(lang.to_string(), messages);
        }

        tracing::info!("🌐 {} catálogos de mensagens carregados", catalogs.len());
        Ok(Self { catalogs: Arc::new(catalogs) })
    }

    /// Busca `key` no idioma pedido, cai para o francês e, em último caso,
    /// devolve a própria chave. `{nome}` é substituído pelos argumentos.
    pub fn translate(&self, locale: &str, key: &str, args: &[(&str, String)]) -> String {
        let template = self
            .catalogs
            .get(locale)
            .and_then(|c| c.get(key))
            .or_else(|| self.catalogs.get(DEFAULT_LOCALE).and_then(|c| c.get(key)));

        let Some(template) = template else {
            tracing::warn!("Mensagem sem tradução: {}", key);
            return key.to_string();
        };

        args.iter().fold(template.clone(), |msg, (name, value)| {
            msg.replace(&format!("{{{}}}", name), value)
        })
    }
}
