//! Self-describing level documents.
//!
//! Each document lists sections of one entity kind, either as an array of
//! tables named after the kind:
//!
//! ```toml
//! [[thing]]
//! mappos = [1200, 3400, 0]
//! oclass = 1
//! ```
//!
//! or as a declared count plus numbered tables:
//!
//! ```toml
//! [common]
//! count = 2
//!
//! [thing0]
//! ...
//! [thing1]
//! ...
//! ```

use std::path::Path;

use toml::{Table, Value};

use crate::error::{LoadError, Loaded};
use crate::level::entity::EntityAdapter;

/// Typed access to one section's keys.
pub struct Section<'a> {
    name: &'a str,
    table: &'a Table,
}

impl<'a> Section<'a> {
    pub fn new(name: &'a str, table: &'a Table) -> Self {
        Self { name, table }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn has(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    fn integer(&self, key: &str, value: &Value) -> Result<i64, String> {
        value
            .as_integer()
            .ok_or_else(|| format!("`{key}` must be an integer"))
    }

    fn convert<T: TryFrom<i64>>(key: &str, v: i64) -> Result<T, String> {
        T::try_from(v).map_err(|_| format!("`{key}` value {v} is out of range"))
    }

    pub fn required<T: TryFrom<i64>>(&self, key: &str) -> Result<T, String> {
        let value = self
            .table
            .get(key)
            .ok_or_else(|| format!("missing required `{key}`"))?;
        Self::convert(key, self.integer(key, value)?)
    }

    pub fn optional<T: TryFrom<i64>>(&self, key: &str, default: T) -> Result<T, String> {
        match self.table.get(key) {
            Some(value) => Self::convert(key, self.integer(key, value)?),
            None => Ok(default),
        }
    }

    pub fn flag(&self, key: &str) -> Result<bool, String> {
        match self.table.get(key) {
            None => Ok(false),
            Some(Value::Boolean(b)) => Ok(*b),
            Some(Value::Integer(i)) => Ok(*i != 0),
            Some(_) => Err(format!("`{key}` must be a boolean")),
        }
    }

    /// Reads an integer array of at most `N` values; shorter arrays are zero
    /// padded unless `exact` is set.
    pub fn array<T, const N: usize>(&self, key: &str, exact: bool) -> Result<[T; N], String>
    where
        T: TryFrom<i64> + Copy + Default,
    {
        let items = self
            .table
            .get(key)
            .ok_or_else(|| format!("missing required `{key}`"))?
            .as_array()
            .ok_or_else(|| format!("`{key}` must be an array"))?;
        if items.len() > N || (exact && items.len() != N) {
            return Err(format!(
                "`{key}` has {} values, expected {}{}",
                items.len(),
                if exact { "" } else { "at most " },
                N
            ));
        }
        let mut out = [T::default(); N];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = Self::convert(key, self.integer(key, item)?)?;
        }
        Ok(out)
    }
}

/// Parses a structured document and runs each section through `A`.
///
/// A document that is not valid TOML fails as a whole. Sections that fail
/// validation are skipped, and more than `max` sections are cut to `max`;
/// both are reported as warnings.
pub fn load_sections<A: EntityAdapter>(
    text: &str,
    path: &Path,
    max: usize,
) -> Result<Loaded<Vec<A::Record>>, LoadError> {
    let doc: Table = toml::from_str(text).map_err(|source| LoadError::Structured {
        path: path.to_path_buf(),
        source,
    })?;
    let kind = A::KIND.section_name();
    let mut warnings = Vec::new();

    let (declared, items) = match doc.get(kind) {
        Some(Value::Array(items)) => (items.len(), Some(items)),
        _ => {
            let declared = doc
                .get("common")
                .and_then(Value::as_table)
                .and_then(|common| common.get("count"))
                .and_then(Value::as_integer)
                .unwrap_or(0);
            (usize::try_from(declared).unwrap_or(0), None)
        }
    };
    if declared > max {
        log::warn!(
            "{}: {declared} {kind} sections, only {max} supported",
            path.display()
        );
        warnings.push(LoadError::clamped(
            format!("{} {kind} sections", path.display()),
            i64::try_from(declared).unwrap_or(i64::MAX),
            max,
        ));
    }

    let used = declared.min(max);
    let sections: Vec<(String, Option<&Table>)> = match items {
        Some(items) => items
            .iter()
            .take(used)
            .enumerate()
            .map(|(i, item)| (format!("{kind}[{i}]"), item.as_table()))
            .collect(),
        None => (0..used)
            .map(|i| {
                let name = format!("{kind}{i}");
                let table = doc.get(&name).and_then(Value::as_table);
                (name, table)
            })
            .collect(),
    };

    let mut records = Vec::with_capacity(used);
    for (name, table) in sections {
        let result = match table {
            Some(table) => A::from_section(&Section::new(&name, table)),
            None => Err("section is missing or not a table".to_string()),
        };
        match result {
            Ok(record) => records.push(record),
            Err(reason) => {
                log::warn!("{}: skipping {name}: {reason}", path.display());
                warnings.push(LoadError::InvalidSection {
                    kind,
                    section: name,
                    reason,
                });
            }
        }
    }

    Ok(Loaded::with_warnings(records, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::entity::{ActionPointAdapter, ThingAdapter};

    #[test]
    fn array_shape() {
        let text = r#"
            [[actionpoint]]
            x = 10
            y = 20
            num = 1

            [[actionpoint]]
            x = 30
            y = 40
            range = 512
            num = 2
        "#;
        let loaded =
            load_sections::<ActionPointAdapter>(text, Path::new("map00001.aptfx"), 31).unwrap();
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.value.len(), 2);
        assert_eq!(loaded.value[1].range, 512);
    }

    #[test]
    fn counted_shape_reports_missing_sections() {
        let text = r#"
            [common]
            count = 3

            [actionpoint0]
            x = 1
            y = 1
            num = 1

            [actionpoint2]
            x = 2
            y = 2
            num = 3
        "#;
        let loaded =
            load_sections::<ActionPointAdapter>(text, Path::new("map00001.aptfx"), 31).unwrap();
        assert_eq!(loaded.value.len(), 2);
        assert!(matches!(
            loaded.warnings.as_slice(),
            [LoadError::InvalidSection { section, .. }] if section == "actionpoint1"
        ));
    }

    #[test]
    fn out_of_range_field_skips_section() {
        let text = r#"
            [[thing]]
            mappos = [70000, 0, 0]
            oclass = 1
            model = 1

            [[thing]]
            mappos = [100, 200, 0]
            oclass = 1
            model = 2
        "#;
        let loaded = load_sections::<ThingAdapter>(text, Path::new("t.tngfx"), 2046).unwrap();
        assert_eq!(loaded.value.len(), 1);
        assert_eq!(loaded.value[0].model, 2);
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn excess_sections_are_clamped() {
        let mut text = String::new();
        for i in 0..5 {
            text.push_str(&format!("[[actionpoint]]\nx = {i}\ny = 0\nnum = {}\n", i + 1));
        }
        let loaded = load_sections::<ActionPointAdapter>(&text, Path::new("a"), 3).unwrap();
        assert_eq!(loaded.value.len(), 3);
        assert!(matches!(
            loaded.warnings.as_slice(),
            [LoadError::CountClamped { declared: 5, used: 3, .. }]
        ));
    }

    #[test]
    fn huge_declared_count_is_clamped_before_reading() {
        let text = "[common]\ncount = 9223372036854775807\n\n[actionpoint0]\nx = 1\ny = 1\nnum = 1\n";
        let loaded =
            load_sections::<ActionPointAdapter>(text, Path::new("map00001.aptfx"), 31).unwrap();
        assert_eq!(loaded.value.len(), 1);
        assert!(matches!(
            loaded.warnings.first(),
            Some(LoadError::CountClamped {
                declared: i64::MAX,
                used: 31,
                ..
            })
        ));
        // actionpoint1..30 are declared but absent
        assert_eq!(loaded.warnings.len(), 31);
    }

    #[test]
    fn negative_count_reads_nothing() {
        let loaded = load_sections::<ActionPointAdapter>(
            "[common]\ncount = -4\n",
            Path::new("map00001.aptfx"),
            31,
        )
        .unwrap();
        assert!(loaded.value.is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = load_sections::<ThingAdapter>("[[thing]\n", Path::new("bad.tngfx"), 10)
            .unwrap_err();
        assert!(matches!(err, LoadError::Structured { .. }));
    }
}
