//! Authorization model file parsing (spec §6).
//!
//! The model file is a small INI-style document — section headers in
//! brackets, `key = value` lines, `#` comments — declaring the shape of the
//! three relations the engine evaluates over:
//!
//! ```ini
//! [request_definition]
//! r = sub, act, obj
//!
//! [policy_definition]
//! p = role, obj, act
//!
//! [role_definition]
//! g = user, role, obj
//! g2 = child_obj, parent_obj
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.role, p.obj) && g2(r.obj, p.obj) && keyMatch(r.act, p.act)
//! ```
//!
//! This module only parses and validates the declaration; `AuthorizationEngine`
//! does not interpret `m` as an expression (spec §9's re-architecture
//! guidance is to hand-roll the matcher rather than embed a generic
//! expression evaluator). The parsed model is surfaced through `kavachctl
//! policy dump` and checked at startup so a malformed or mismatched model
//! file fails fast rather than silently diverging from the hand-rolled
//! engine.

use std::collections::HashMap;
use std::path::Path;

use crate::error::AppError;

const EXPECTED_REQUEST_SHAPE: &str = "sub, act, obj";
const EXPECTED_POLICY_SHAPE: &str = "role, obj, act";
const EXPECTED_GROUPING_SHAPE: &str = "user, role, obj";
const EXPECTED_HIERARCHY_SHAPE: &str = "child_obj, parent_obj";

#[derive(Debug, Clone)]
pub struct AuthorizationModel {
    sections: HashMap<String, HashMap<String, String>>,
}

impl AuthorizationModel {
    /// The model this binary's hand-rolled engine actually implements,
    /// used when no model file is supplied (tests, `kavachctl` dry runs).
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_MODEL).expect("builtin model is well-formed")
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::InvalidBody(format!(
                "could not read authorization model file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let model = Self::parse(&text)?;
        model.validate()?;
        Ok(model)
    }

    fn parse(text: &str) -> Result<Self, AppError> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(stripped) = line.strip_prefix('[') {
                let name = stripped
                    .strip_suffix(']')
                    .ok_or_else(|| AppError::InvalidBody(format!("malformed section header: {line}")))?;
                current = name.trim().to_string();
                sections.entry(current.clone()).or_default();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(AppError::InvalidBody(format!(
                    "expected `key = value`, got: {line}"
                )));
            };
            if current.is_empty() {
                return Err(AppError::InvalidBody(
                    "key = value line appears before any [section]".into(),
                ));
            }
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { sections })
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    /// Confirm the declared relation shapes match what `authz::mod` actually
    /// implements — `r`, `p`, `g`, `g2` are fixed, not user-extensible.
    fn validate(&self) -> Result<(), AppError> {
        let checks = [
            ("request_definition", "r", EXPECTED_REQUEST_SHAPE),
            ("policy_definition", "p", EXPECTED_POLICY_SHAPE),
            ("role_definition", "g", EXPECTED_GROUPING_SHAPE),
            ("role_definition", "g2", EXPECTED_HIERARCHY_SHAPE),
        ];
        for (section, key, expected) in checks {
            let actual = self.get(section, key).ok_or_else(|| {
                AppError::InvalidBody(format!("model file missing [{section}] {key}"))
            })?;
            let normalized: String = actual.split(',').map(|s| s.trim()).collect::<Vec<_>>().join(", ");
            if normalized != expected {
                return Err(AppError::InvalidBody(format!(
                    "model file [{section}] {key} = \"{actual}\" does not match the shape this engine implements (\"{expected}\")"
                )));
            }
        }
        if self.get("matchers", "m").is_none() {
            return Err(AppError::InvalidBody(
                "model file missing [matchers] m".into(),
            ));
        }
        Ok(())
    }

    pub fn matcher_expression(&self) -> Option<&str> {
        self.get("matchers", "m")
    }
}

const BUILTIN_MODEL: &str = "[request_definition]\n\
r = sub, act, obj\n\
\n\
[policy_definition]\n\
p = role, obj, act\n\
\n\
[role_definition]\n\
g = user, role, obj\n\
g2 = child_obj, parent_obj\n\
\n\
[policy_effect]\n\
e = some(where (p.eft == allow))\n\
\n\
[matchers]\n\
m = g(r.sub, p.role, p.obj) && g2(r.obj, p.obj) && keyMatch(r.act, p.act)\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_model_validates() {
        let model = AuthorizationModel::builtin();
        assert!(model.matcher_expression().is_some());
    }

    #[test]
    fn rejects_mismatched_policy_shape() {
        let text = BUILTIN_MODEL.replace("p = role, obj, act", "p = sub, obj, act, eft");
        let model = AuthorizationModel::parse(&text).unwrap();
        assert!(model.validate().is_err());
    }

    #[test]
    fn rejects_missing_matchers_section() {
        let text: String = BUILTIN_MODEL
            .lines()
            .filter(|l| !l.starts_with("[matchers]") && !l.starts_with("m ="))
            .collect::<Vec<_>>()
            .join("\n");
        let model = AuthorizationModel::parse(&text).unwrap();
        assert!(model.validate().is_err());
    }
}
