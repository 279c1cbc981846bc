use wayfarer_core::config::ModelConfig;

/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            extra_headers: &[],
        }),
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1/chat/completions",
            extra_headers: &[],
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            extra_headers: &[],
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            extra_headers: &[("X-Title", "Wayfarer")],
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1/chat/completions",
            extra_headers: &[],
        }),
        _ => None,
    }
}

/// Fill `base_url` and preset headers for a known provider.
///
/// Values already present in the config take precedence.
pub fn apply_preset_defaults(config: &mut ModelConfig) {
    let Some(preset) = get_preset(&config.provider) else {
        return;
    };
    if config.base_url.is_none() {
        config.base_url = Some(preset.default_base_url.to_string());
    }
    for (k, v) in preset.extra_headers {
        config
            .extra_headers
            .entry(k.to_string())
            .or_insert_with(|| v.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groq_preset_fills_base_url() {
        let mut config = ModelConfig::default();
        apply_preset_defaults(&mut config);
        assert_eq!(
            config.base_url.as_deref(),
            Some("https://api.groq.com/openai/v1/chat/completions")
        );
    }

    #[test]
    fn test_explicit_values_win() {
        let mut config = ModelConfig {
            provider: "openrouter".into(),
            base_url: Some("http://proxy.local/v1/chat/completions".into()),
            ..ModelConfig::default()
        };
        config.extra_headers.insert("X-Title".into(), "Custom".into());
        apply_preset_defaults(&mut config);
        assert_eq!(
            config.base_url.as_deref(),
            Some("http://proxy.local/v1/chat/completions")
        );
        assert_eq!(config.extra_headers["X-Title"], "Custom");
    }

    #[test]
    fn test_unknown_provider_untouched() {
        let mut config = ModelConfig {
            provider: "vllm".into(),
            ..ModelConfig::default()
        };
        apply_preset_defaults(&mut config);
        assert!(config.base_url.is_none());
        assert!(config.extra_headers.is_empty());
    }
}
