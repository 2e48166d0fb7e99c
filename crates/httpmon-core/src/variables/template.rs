use std::collections::{BTreeMap, HashMap};

use super::VariableTable;

/// Flat name → value lookup built from a [`VariableTable`].
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: HashMap<String, String>,
}

impl Substitutions {
    /// Single pass over the table; later entries overwrite earlier ones.
    pub fn from_table(table: &VariableTable) -> Self {
        let mut values = HashMap::with_capacity(table.len());
        for variable in table.iter() {
            values.insert(variable.name.clone(), variable.value.clone());
        }
        Self { values }
    }

    /// Replace every `{name}` whose name is known. Unknown placeholders are
    /// kept verbatim and substituted text is never scanned again.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let known = after
                .find('}')
                .and_then(|close| self.values.get(&after[..close]).map(|v| (close, v)));
            match known {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Render every value of a multi-valued map (query parameters, headers).
    /// Keys are left untouched and value order is preserved.
    pub fn render_values(&self, map: &BTreeMap<String, Vec<String>>) -> Vec<(String, String)> {
        map.iter()
            .flat_map(|(key, values)| values.iter().map(move |v| (key.clone(), self.render(v))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::{VarSource, Variable};

    fn table(pairs: &[(&str, &str)]) -> VariableTable {
        let mut t = VariableTable::new();
        for (k, v) in pairs {
            t.push(Variable::provided(*k, *v));
        }
        t
    }

    #[test]
    fn no_placeholders_is_identity() {
        let subs = table(&[("a", "1")]).substitutions();
        for s in ["", "plain", "http://x/y?z=1", "}{", "{", "}"] {
            assert_eq!(subs.render(s), s);
        }
    }

    #[test]
    fn replaces_every_occurrence() {
        let subs = table(&[("token", "abc"), ("id", "7")]).substitutions();
        assert_eq!(subs.render("http://x/{token}"), "http://x/abc");
        assert_eq!(subs.render("{id}-{id}/{token}"), "7-7/abc");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let subs = table(&[("a", "1")]).substitutions();
        assert_eq!(subs.render("{a}/{b}/{}"), "1/{b}/{}");
    }

    #[test]
    fn json_bodies_keep_their_braces() {
        let subs = table(&[("user", "probe")]).substitutions();
        assert_eq!(
            subs.render(r#"{"user":"{user}","nested":{"k":1}}"#),
            r#"{"user":"probe","nested":{"k":1}}"#
        );
        assert_eq!(subs.render("{{user}}"), "{probe}");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let subs = table(&[("a", "{b}"), ("b", "boom")]).substitutions();
        assert_eq!(subs.render("{a}"), "{b}");
    }

    #[test]
    fn second_pass_is_a_fixed_point() {
        let subs = table(&[("host", "svc.local"), ("port", "80")]).substitutions();
        let once = subs.render("http://{host}:{port}/{missing}");
        assert_eq!(subs.render(&once), once);
    }

    #[test]
    fn last_write_wins() {
        let mut t = table(&[("token", "old")]);
        t.push(Variable {
            name: "token".into(),
            source: VarSource::Headers,
            value: "new".into(),
        });
        assert_eq!(t.substitutions().render("{token}"), "new");
    }

    #[test]
    fn renders_multi_valued_maps() {
        let subs = table(&[("t", "abc")]).substitutions();
        let mut map = BTreeMap::new();
        map.insert("Authorization".to_string(), vec!["Bearer {t}".to_string()]);
        map.insert("X-Multi".to_string(), vec!["1".to_string(), "{t}".to_string()]);
        let rendered = subs.render_values(&map);
        assert_eq!(
            rendered,
            vec![
                ("Authorization".to_string(), "Bearer abc".to_string()),
                ("X-Multi".to_string(), "1".to_string()),
                ("X-Multi".to_string(), "abc".to_string()),
            ]
        );
    }
}
