use super::combo::search_roots;
use super::{ActionExecutor, Phase, Progress};
use crate::driver::{Driver, ElementHandle, Query};
use crate::resolution::Intent;
use std::path::PathBuf;
use stepwise_common::ActionError;
use tracing::debug;

const FILE_INPUT_CSS: &str = "input[type=\"file\"]";

impl ActionExecutor {
    pub(super) async fn file_upload(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        path: Option<&str>,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) else {
            return Err(ActionError::protocol("file_upload", hint, "no file path given"));
        };

        let input = match find_file_input(driver).await {
            Some(input) => input,
            None => {
                debug!(hint, "No file input present; clicking trigger to reveal one");
                let trigger = self
                    .resolver
                    .resolve(driver, Intent::Clickable, hint)
                    .await
                    .ok_or_else(|| ActionError::not_found("file_upload", hint))?;
                progress.enter(Phase::Interacting);
                self.prepare(driver, &trigger.element).await;
                self.click_ladder(driver, &trigger.element).await?;
                driver.pause(self.config.delays.upload_reveal()).await;
                find_file_input(driver).await.ok_or_else(|| {
                    ActionError::protocol(
                        "file_upload",
                        hint,
                        "no file input appeared after clicking the trigger",
                    )
                })?
            }
        };

        progress.enter(Phase::Interacting);
        driver.set_input_files(&input, &[PathBuf::from(path)]).await?;
        Ok(())
    }
}

/// File inputs are usually hidden, so presence is enough.
async fn find_file_input(driver: &mut dyn Driver) -> Option<ElementHandle> {
    let query = Query::css(FILE_INPUT_CSS);
    for root in search_roots(driver).await {
        if let Ok(Some(input)) = driver.query_first(&root, &query).await {
            return Some(input);
        }
    }
    None
}
