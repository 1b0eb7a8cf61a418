use crate::db::preferences::{get_preferences, save_preferences, PreferencesSnapshot, SavePreferencesArgs};
use crate::error::AppError;
use crate::market::source::MarketSource;
use crate::state::AppState;

pub async fn preferences_get<S: MarketSource>(
    state: &AppState<S>,
) -> Result<PreferencesSnapshot, AppError> {
    get_preferences(&state.db_pool).await
}

pub async fn preferences_save<S: MarketSource>(
    state: &AppState<S>,
    args: SavePreferencesArgs,
) -> Result<PreferencesSnapshot, AppError> {
    save_preferences(&state.db_pool, args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::app_state;
    use crate::config::Config;
    use crate::db::preferences::Language;

    #[tokio::test]
    async fn saved_language_is_returned_by_get() {
        let state = app_state(Config::default()).await;

        preferences_save(
            &state,
            SavePreferencesArgs {
                language: Some("en".to_string()),
                ..SavePreferencesArgs::default()
            },
        )
        .await
        .expect("save succeeds");

        let snapshot = preferences_get(&state).await.expect("load succeeds");
        assert_eq!(snapshot.language, Language::En);
        assert!(!snapshot.advanced_settings_expanded);
    }
}
