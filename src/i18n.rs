//! Languages and translation tables.
//!
//! Two languages ship: `en-US` and `pt-BR`. The resolution order mirrors the
//! web client: explicit `lang` query parameter beats the `Accept-Language`
//! header, which beats the `en-US` default.

use serde::{Deserialize, Serialize};

/// Supported response languages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "pt-BR")]
    PtBr,
}

impl Language {
    /// The BCP-47 tag stored in cache rows and returned in responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::EnUs => "en-US",
            Language::PtBr => "pt-BR",
        }
    }

    /// Parse an exact tag. Anything unrecognized is `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "en-US" => Some(Language::EnUs),
            "pt-BR" => Some(Language::PtBr),
            _ => None,
        }
    }

    /// Resolve the effective language for a request.
    ///
    /// An explicit `lang` query value wins when it names a supported tag;
    /// otherwise any `pt` in the Accept-Language header selects pt-BR.
    pub fn resolve(query: Option<&str>, accept_language: &str) -> Self {
        if let Some(lang) = query.and_then(Self::from_tag) {
            return lang;
        }
        if accept_language.contains("pt") {
            Language::PtBr
        } else {
            Language::EnUs
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-language string table.
pub struct Translations {
    pub rate_limit_exceeded: &'static str,
    pub username_required: &'static str,
    pub user_not_found: &'static str,
    pub request_failed: &'static str,
    /// System prompt handed to the roast generator.
    pub system_prompt: &'static str,
    /// Substituted when the generator returns an empty roast.
    pub fallback_text: &'static str,
}

static EN_US: Translations = Translations {
    rate_limit_exceeded: "Rate limit exceeded. Try again later.",
    username_required: "GitHub username is required",
    user_not_found: "GitHub user not found",
    request_failed: "Failed to process request",
    system_prompt: "You are a sarcastic and humorous tech critic. Your job is to playfully \
        roast someone's GitHub profile in a funny way. Keep it light-hearted, don't be \
        actually mean or offensive. Select a few repositories to make fun of, and use the \
        user's bio and other information to create a funny roast. Use a few emojis. \
        IMPORTANT: Respond ONLY in English.",
    fallback_text: "Hmm, I couldn't think of anything clever to say. This GitHub profile \
        is too boring to roast.",
};

static PT_BR: Translations = Translations {
    rate_limit_exceeded: "Limite de requisições excedido. Tente novamente mais tarde.",
    username_required: "Nome de usuário do GitHub é obrigatório",
    user_not_found: "Usuário do GitHub não encontrado",
    request_failed: "Falha ao processar a requisição",
    system_prompt: "Você é um crítico de tecnologia sarcástico e bem-humorado. Seu trabalho \
        é zoar o perfil do GitHub de alguém de forma divertida. Mantenha um tom leve, não \
        seja ofensivo de verdade. Selecione alguns repositórios para fazer piada, e use a \
        bio do usuário e outras informações para criar uma zoação engraçada. Use alguns \
        emojis na resposta. IMPORTANTE: Responda APENAS em português brasileiro.",
    fallback_text: "Hmm, não consegui pensar em algo inteligente para dizer. Este perfil \
        do GitHub é entediante demais para zoar.",
};

/// The string table for a language.
pub fn translations(lang: Language) -> &'static Translations {
    match lang {
        Language::EnUs => &EN_US,
        Language::PtBr => &PT_BR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_beats_accept_language() {
        let lang = Language::resolve(Some("en-US"), "pt-BR,pt;q=0.9");
        assert_eq!(lang, Language::EnUs);
    }

    #[test]
    fn test_accept_language_pt_selects_pt_br() {
        let lang = Language::resolve(None, "pt-BR,pt;q=0.9,en;q=0.8");
        assert_eq!(lang, Language::PtBr);
    }

    #[test]
    fn test_unknown_query_falls_through_to_header() {
        let lang = Language::resolve(Some("fr-FR"), "pt");
        assert_eq!(lang, Language::PtBr);
    }

    #[test]
    fn test_default_is_en_us() {
        let lang = Language::resolve(None, "");
        assert_eq!(lang, Language::EnUs);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        // Pure function of inputs: same inputs, same triple component.
        for _ in 0..3 {
            assert_eq!(Language::resolve(Some("pt-BR"), "en-US"), Language::PtBr);
        }
    }

    #[test]
    fn test_tag_roundtrip() {
        for lang in [Language::EnUs, Language::PtBr] {
            assert_eq!(Language::from_tag(lang.as_str()), Some(lang));
        }
    }

    #[test]
    fn test_serde_uses_bcp47_tags() {
        let json = serde_json::to_string(&Language::PtBr).unwrap();
        assert_eq!(json, r#""pt-BR""#);
        let back: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Language::PtBr);
    }

    #[test]
    fn test_fallback_text_is_never_empty() {
        for lang in [Language::EnUs, Language::PtBr] {
            assert!(!translations(lang).fallback_text.is_empty());
        }
    }
}
