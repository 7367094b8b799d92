use std::borrow::Cow;
use std::fmt;

const KEY_PREFIX: &str = "companion";

/// Names one conversation namespace: a user talking to a companion through a model.
///
/// Built fresh for every request; only its derived storage key is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompanionKey {
    pub companion_id: String,
    pub user_id: String,
    pub model_name: String,
}

impl CompanionKey {
    pub fn new(
        companion_id: impl Into<String>,
        user_id: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            companion_id: companion_id.into(),
            user_id: user_id.into(),
            model_name: model_name.into(),
        }
    }

    /// `companion:{companion}:{model}:{user}` with `\` and `:` escaped in
    /// each part, so distinct keys never map to the same string.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            KEY_PREFIX,
            escape(&self.companion_id),
            escape(&self.model_name),
            escape(&self.user_id)
        )
    }
}

impl fmt::Display for CompanionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Identifier of the similarity index built for a companion.
pub fn document_id_for(companion_id: &str) -> String {
    format!("{}.txt", companion_id)
}

fn escape(part: &str) -> Cow<'_, str> {
    if !part.contains(['\\', ':']) {
        return Cow::Borrowed(part);
    }

    let mut out = String::with_capacity(part.len() + 4);
    for ch in part.chars() {
        if ch == '\\' || ch == ':' {
            out.push('\\');
        }
        out.push(ch);
    }
    Cow::Owned(out)
}
