use crate::error::AppError;
use crate::market::labels::now_unix_ms;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

const LANGUAGE_KEY: &str = "language";
const ADVANCED_SETTINGS_KEY: &str = "advancedSettingsExpanded";
const REMEMBERED_USER_KEY: &str = "rememberedUser";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
    Uk,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ru => "ru",
            Self::En => "en",
            Self::Uk => "uk",
        }
    }

    pub fn parse_str(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ru" => Ok(Self::Ru),
            "en" => Ok(Self::En),
            "uk" => Ok(Self::Uk),
            _ => Err(AppError::InvalidArgument(format!(
                "unsupported language: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesSnapshot {
    pub language: Language,
    pub advanced_settings_expanded: bool,
    pub remembered_user: Option<String>,
}

/// Absent fields are left untouched; an empty `remembered_user` forgets it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SavePreferencesArgs {
    pub language: Option<String>,
    pub advanced_settings_expanded: Option<bool>,
    pub remembered_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PreferenceWrite {
    Set(&'static str, String),
    Remove(&'static str),
}

impl SavePreferencesArgs {
    fn normalize(self) -> Result<Vec<PreferenceWrite>, AppError> {
        let mut writes = Vec::new();
        if let Some(language) = self.language {
            let language = Language::parse_str(&language)?;
            writes.push(PreferenceWrite::Set(LANGUAGE_KEY, language.as_str().to_string()));
        }
        if let Some(expanded) = self.advanced_settings_expanded {
            writes.push(PreferenceWrite::Set(ADVANCED_SETTINGS_KEY, expanded.to_string()));
        }
        if let Some(user) = self.remembered_user {
            let user = user.trim();
            if user.is_empty() {
                writes.push(PreferenceWrite::Remove(REMEMBERED_USER_KEY));
            } else {
                writes.push(PreferenceWrite::Set(REMEMBERED_USER_KEY, user.to_string()));
            }
        }
        Ok(writes)
    }
}

fn apply_row(snapshot: &mut PreferencesSnapshot, key: &str, value: String) {
    match key {
        LANGUAGE_KEY => {
            // unknown stored values fall back to the default
            snapshot.language = Language::parse_str(&value).unwrap_or_default();
        }
        ADVANCED_SETTINGS_KEY => snapshot.advanced_settings_expanded = value == "true",
        REMEMBERED_USER_KEY => snapshot.remembered_user = Some(value),
        _ => {}
    }
}

pub async fn get_preferences(pool: &SqlitePool) -> Result<PreferencesSnapshot, AppError> {
    let rows = sqlx::query("SELECT key, value FROM preferences")
        .fetch_all(pool)
        .await?;

    let mut snapshot = PreferencesSnapshot::default();
    for row in rows {
        let key: String = row.try_get("key")?;
        let value: String = row.try_get("value")?;
        apply_row(&mut snapshot, &key, value);
    }

    Ok(snapshot)
}

pub async fn save_preferences(
    pool: &SqlitePool,
    args: SavePreferencesArgs,
) -> Result<PreferencesSnapshot, AppError> {
    let writes = args.normalize()?;
    let updated_at_ms = now_unix_ms();

    let mut transaction = pool.begin().await?;
    for write in writes {
        match write {
            PreferenceWrite::Set(key, value) => {
                sqlx::query(
                    "INSERT INTO preferences (key, value, updated_at_ms) VALUES (?, ?, ?) \
                     ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at_ms=excluded.updated_at_ms",
                )
                .bind(key)
                .bind(value)
                .bind(updated_at_ms)
                .execute(&mut *transaction)
                .await?;
            }
            PreferenceWrite::Remove(key) => {
                sqlx::query("DELETE FROM preferences WHERE key = ?")
                    .bind(key)
                    .execute(&mut *transaction)
                    .await?;
            }
        }
    }
    transaction.commit().await?;

    get_preferences(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize_memory_pool;

    #[tokio::test]
    async fn empty_store_returns_defaults() {
        let pool = initialize_memory_pool().await.expect("memory pool");
        let snapshot = get_preferences(&pool).await.expect("preferences load");

        assert_eq!(snapshot, PreferencesSnapshot::default());
        assert_eq!(snapshot.language, Language::Ru);
    }

    #[tokio::test]
    async fn preferences_round_trip() {
        let pool = initialize_memory_pool().await.expect("memory pool");

        let saved = save_preferences(
            &pool,
            SavePreferencesArgs {
                language: Some(" UK ".to_string()),
                advanced_settings_expanded: Some(true),
                remembered_user: Some("trader42".to_string()),
            },
        )
        .await
        .expect("save succeeds");

        assert_eq!(saved.language, Language::Uk);
        assert!(saved.advanced_settings_expanded);
        assert_eq!(saved.remembered_user.as_deref(), Some("trader42"));
        assert_eq!(get_preferences(&pool).await.expect("reload"), saved);
    }

    #[tokio::test]
    async fn partial_save_keeps_other_keys_and_blank_user_forgets() {
        let pool = initialize_memory_pool().await.expect("memory pool");
        save_preferences(
            &pool,
            SavePreferencesArgs {
                language: Some("en".to_string()),
                remembered_user: Some("trader42".to_string()),
                ..SavePreferencesArgs::default()
            },
        )
        .await
        .expect("first save");

        let snapshot = save_preferences(
            &pool,
            SavePreferencesArgs {
                remembered_user: Some("  ".to_string()),
                ..SavePreferencesArgs::default()
            },
        )
        .await
        .expect("second save");

        assert_eq!(snapshot.language, Language::En);
        assert_eq!(snapshot.remembered_user, None);
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected_before_writing() {
        let pool = initialize_memory_pool().await.expect("memory pool");
        let error = save_preferences(
            &pool,
            SavePreferencesArgs {
                language: Some("de".to_string()),
                advanced_settings_expanded: Some(true),
                ..SavePreferencesArgs::default()
            },
        )
        .await
        .expect_err("language must be validated");

        assert!(matches!(error, AppError::InvalidArgument(_)));
        assert!(!get_preferences(&pool).await.expect("reload").advanced_settings_expanded);
    }
}
