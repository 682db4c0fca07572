use crate::config::schema::{AIConfig, AppConfig, PipelineConfig};
use crate::error::{DemoError, Result};

/// Validate the whole configuration before the service starts
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_pipeline(&config.pipeline)?;
    validate_ai(&config.ai)?;

    if config.server.port == 0 {
        return Err(DemoError::Validation(
            "Server port cannot be 0".to_string(),
        ));
    }

    let viewport = config.browser.viewport;
    if viewport.width == 0 || viewport.height == 0 {
        return Err(DemoError::Validation(format!(
            "Invalid viewport {}x{}",
            viewport.width, viewport.height
        )));
    }

    Ok(())
}

/// Most interactive elements a planning prompt may list
pub const MAX_PLAN_ELEMENTS: usize = 10;

pub fn validate_pipeline(pipeline: &PipelineConfig) -> Result<()> {
    let caps = [
        ("rank_candidate_cap", pipeline.rank_candidate_cap),
        ("plan_element_cap", pipeline.plan_element_cap),
        ("analysis_element_cap", pipeline.analysis_element_cap),
    ];
    for (name, value) in caps {
        if value == 0 {
            return Err(DemoError::Validation(format!("{} must be positive", name)));
        }
    }

    if pipeline.plan_element_cap > MAX_PLAN_ELEMENTS {
        return Err(DemoError::Validation(format!(
            "plan_element_cap must be at most {}",
            MAX_PLAN_ELEMENTS
        )));
    }

    if pipeline.action_timeout_ms == 0 || pipeline.navigation_timeout_ms == 0 {
        return Err(DemoError::Validation(
            "Action and navigation timeouts must be positive".to_string(),
        ));
    }

    Ok(())
}

/// Check `provider_id:model_name` selections against the configured providers
pub fn validate_ai(ai: &AIConfig) -> Result<()> {
    for selection in [&ai.default_llm, &ai.ranking_llm].into_iter().flatten() {
        let (provider_id, model) = selection.split_once(':').ok_or_else(|| {
            DemoError::Validation(format!(
                "Invalid model selection '{}'. Expected 'provider_id:model_name'",
                selection
            ))
        })?;
        if provider_id.is_empty() || model.is_empty() {
            return Err(DemoError::Validation(format!(
                "Invalid model selection '{}'",
                selection
            )));
        }
        if !ai.providers.contains_key(provider_id) {
            return Err(DemoError::Validation(format!(
                "Provider '{}' not configured",
                provider_id
            )));
        }
    }

    for (id, provider) in &ai.providers {
        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            return Err(DemoError::Validation(format!(
                "Provider '{}' has invalid base_url: {}",
                id, provider.base_url
            )));
        }
    }

    Ok(())
}
