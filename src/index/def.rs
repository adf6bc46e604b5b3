//! Index and key definitions: which record fields form the key, how they
//! compare, and the options that shape a concrete index.

use std::cmp::Ordering;

use crate::record::{compare_values, Record, Value};

/// Declared type of a key part.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldType {
    /// Boolean.
    Boolean,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit floating point.
    Double,
    /// UTF-8 string, compared under the part's collation.
    String,
    /// Raw bytes, compared lexicographically.
    Binary,
}

/// String comparison rule for a key part.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Collation {
    /// Byte-wise comparison.
    #[default]
    Binary,
    /// ASCII case-insensitive comparison.
    CaseInsensitive,
}

/// One part of a key definition.
#[derive(Clone, Debug)]
pub struct KeyPart {
    /// Zero-based field position inside the record.
    pub field: usize,
    /// Declared field type.
    pub ty: FieldType,
    /// Whether the field may hold `Null`.
    pub nullable: bool,
    /// Collation applied when `ty` is [`FieldType::String`].
    pub collation: Collation,
}

impl KeyPart {
    /// A non-nullable, binary-collated part over `field` of type `ty`.
    pub fn new(field: usize, ty: FieldType) -> Self {
        Self {
            field,
            ty,
            nullable: false,
            collation: Collation::Binary,
        }
    }

    /// Marks the part as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the part's collation.
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    /// Stored-order comparison. Fold ties under a case-insensitive collation
    /// break byte-wise so the order between distinct spellings stays total.
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match self.compare_key(a, b) {
            Ordering::Equal => match (self.collation, a, b) {
                (Collation::CaseInsensitive, Value::Str(x), Value::Str(y)) => x.cmp(y),
                _ => Ordering::Equal,
            },
            other => other,
        }
    }

    /// Collation comparison without the byte-wise refinement. Search keys
    /// must match any spelling the collation folds together, so this is the
    /// comparison record-against-key lookups use.
    fn compare_key(&self, a: &Value, b: &Value) -> Ordering {
        match (self.collation, a, b) {
            (Collation::CaseInsensitive, Value::Str(x), Value::Str(y)) => x
                .bytes()
                .map(|c| c.to_ascii_lowercase())
                .cmp(y.bytes().map(|c| c.to_ascii_lowercase())),
            _ => compare_values(a, b),
        }
    }
}

/// Ordered sequence of key parts defining an index key.
#[derive(Clone, Debug)]
pub struct KeyDef {
    parts: Vec<KeyPart>,
}

impl KeyDef {
    /// Builds a key definition from its parts. Panics on an empty part list:
    /// a keyless index is a caller contract breach.
    pub fn new(parts: Vec<KeyPart>) -> Self {
        assert!(!parts.is_empty(), "key definition must have parts");
        Self { parts }
    }

    /// The parts in order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// Number of parts.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Whether any part admits `Null`.
    pub fn is_nullable(&self) -> bool {
        self.parts.iter().any(|p| p.nullable)
    }

    /// Whether `record` stores `Null` (or nothing) in any part of this key.
    pub fn key_has_null(&self, record: &Record) -> bool {
        self.parts
            .iter()
            .any(|p| record.field(p.field).unwrap_or(&Value::Null).is_null())
    }

    /// Compares two records over every part of this definition.
    pub fn compare_records(&self, a: &Record, b: &Record) -> Ordering {
        for part in &self.parts {
            let av = a.field(part.field).unwrap_or(&Value::Null);
            let bv = b.field(part.field).unwrap_or(&Value::Null);
            match part.compare(av, bv) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Compares a record against a partial search key covering the first
    /// `part_count` parts. Returns the ordering of the record relative to
    /// the key.
    pub fn compare_with_key(&self, record: &Record, key: &[Value], part_count: usize) -> Ordering {
        debug_assert!(part_count <= self.parts.len());
        debug_assert!(part_count <= key.len());
        for (part, kv) in self.parts.iter().zip(key.iter()).take(part_count) {
            let rv = record.field(part.field).unwrap_or(&Value::Null);
            match part.compare_key(rv, kv) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

/// Options attached to an index definition.
#[derive(Clone, Debug)]
pub struct IndexOpts {
    /// Whether the index enforces key uniqueness.
    pub unique: bool,
    /// Whether comparisons precompute a hint scalar for the first part.
    pub use_hints: bool,
}

impl Default for IndexOpts {
    fn default() -> Self {
        Self {
            unique: false,
            use_hints: true,
        }
    }
}

/// Full definition of one index: naming, options, and key layout.
#[derive(Clone, Debug)]
pub struct IndexDef {
    /// Index name, used in constraint-violation errors.
    pub name: String,
    /// Name of the containing space.
    pub space: String,
    /// Index options.
    pub opts: IndexOpts,
    /// User-visible key definition.
    pub key_def: KeyDef,
}

impl IndexDef {
    /// Convenience constructor.
    pub fn new(
        name: impl Into<String>,
        space: impl Into<String>,
        opts: IndexOpts,
        key_def: KeyDef,
    ) -> Self {
        Self {
            name: name.into(),
            space: space.into(),
            opts,
            key_def,
        }
    }

    /// Whether ordering needs the hidden identity tiebreaker. A unique index
    /// over non-nullable parts already orders totally by its own key; every
    /// other index (non-unique, or unique-but-nullable so several NULL keys
    /// may coexist) extends the order with the record identity.
    pub fn needs_identity_tiebreak(&self) -> bool {
        !self.opts.unique || self.key_def.is_nullable()
    }
}

/// Scan modes supported by index iterators.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanType {
    /// Equality, ascending within the matching run.
    Eq,
    /// Equality, descending within the matching run.
    Req,
    /// Full scan, ascending.
    All,
    /// Strictly less than the key, descending.
    Lt,
    /// Less than or equal to the key, descending.
    Le,
    /// Greater than or equal to the key, ascending.
    Ge,
    /// Strictly greater than the key, ascending.
    Gt,
}

impl ScanType {
    /// Whether the scan walks the order backwards.
    pub fn is_reverse(self) -> bool {
        matches!(self, ScanType::Req | ScanType::Lt | ScanType::Le)
    }
}

/// Duplicate-resolution mode for [`crate::index::Index::replace`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DupReplaceMode {
    /// Fail when an equal-keyed record already exists (unless it is the
    /// record being overwritten).
    Insert,
    /// Fail when there is nothing to replace.
    Replace,
    /// Insert or replace, whichever applies.
    InsertOrReplace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    fn rec(id: u64, fields: Vec<Value>) -> crate::record::RecordRef {
        Record::new(RecordId(id), fields)
    }

    #[test]
    fn multi_part_comparison_is_lexicographic() {
        let def = KeyDef::new(vec![
            KeyPart::new(0, FieldType::Integer),
            KeyPart::new(1, FieldType::String),
        ]);
        let a = rec(1, vec![Value::Int(1), Value::Str("b".into())]);
        let b = rec(2, vec![Value::Int(1), Value::Str("c".into())]);
        let c = rec(3, vec![Value::Int(2), Value::Str("a".into())]);
        assert_eq!(def.compare_records(&a, &b), Ordering::Less);
        assert_eq!(def.compare_records(&b, &c), Ordering::Less);
        assert_eq!(def.compare_records(&a, &a), Ordering::Equal);
    }

    #[test]
    fn partial_key_compares_prefix_only() {
        let def = KeyDef::new(vec![
            KeyPart::new(0, FieldType::Integer),
            KeyPart::new(1, FieldType::Integer),
        ]);
        let r = rec(1, vec![Value::Int(5), Value::Int(9)]);
        assert_eq!(def.compare_with_key(&r, &[Value::Int(5)], 1), Ordering::Equal);
        assert_eq!(
            def.compare_with_key(&r, &[Value::Int(5), Value::Int(10)], 2),
            Ordering::Less
        );
    }

    #[test]
    fn case_insensitive_collation_folds_ascii() {
        let def = KeyDef::new(vec![KeyPart::new(
            0,
            FieldType::String,
        )
        .with_collation(Collation::CaseInsensitive)]);
        let a = rec(1, vec![Value::Str("Apple".into())]);
        let b = rec(2, vec![Value::Str("aPPLE".into())]);
        let c = rec(3, vec![Value::Str("banana".into())]);
        assert_eq!(
            def.compare_with_key(&a, &[Value::Str("apple".into())], 1),
            Ordering::Equal
        );
        assert_ne!(def.compare_records(&a, &b), Ordering::Equal);
        assert_eq!(def.compare_records(&a, &c), Ordering::Less);
    }

    #[test]
    fn tiebreak_required_for_nullable_unique() {
        let unique = IndexDef::new(
            "pk",
            "items",
            IndexOpts {
                unique: true,
                use_hints: true,
            },
            KeyDef::new(vec![KeyPart::new(0, FieldType::Integer)]),
        );
        assert!(!unique.needs_identity_tiebreak());

        let nullable_unique = IndexDef::new(
            "sk",
            "items",
            IndexOpts {
                unique: true,
                use_hints: true,
            },
            KeyDef::new(vec![KeyPart::new(0, FieldType::Integer).nullable()]),
        );
        assert!(nullable_unique.needs_identity_tiebreak());
    }
}
