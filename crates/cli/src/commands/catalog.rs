use aula_core::catalog::IntentCatalog;
use aula_core::config::LoadOptions;
use serde_json::{json, Value};

use crate::commands::{application_failure, load_catalog, load_config, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("catalog", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let store = match load_catalog(&config) {
        Ok(store) => store,
        Err(error) => {
            return CommandResult::from_step("catalog", application_failure(error));
        }
    };
    let catalog = store.current();
    let source = store
        .source()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "builtin".to_string());

    CommandResult::success_with_data(
        "catalog",
        format!(
            "intent catalog {} ({source}): {} intents",
            catalog.version,
            catalog.intents.len()
        ),
        Some(describe(&catalog)),
    )
}

fn describe(catalog: &IntentCatalog) -> Value {
    let intents = catalog
        .intents
        .iter()
        .map(|intent| {
            json!({
                "name": intent.name,
                "keywords": intent.keywords.len(),
                "patterns": intent.patterns.len(),
                "slots": intent.slots,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "version": catalog.version,
        "intents": intents,
        "synonym_groups": catalog.synonyms.len(),
        "stopwords": catalog.stopwords.len(),
    })
}
