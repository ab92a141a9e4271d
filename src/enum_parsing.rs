//! Fuzzy mapping of free-text LLM output onto closed enum sets.
//!
//! LLMs asked for `"heavy"` happily answer `"Heavy (hearts, stars)"` or
//! `"uses heavy emoji"`. [`parse_enum`] tries, in order and case-insensitively on
//! the trimmed input: an exact match, a prefix match, then a substring match.
//! Anything else falls back to the caller's default.

/// A closed enum whose members have canonical lowercase names.
pub trait FuzzyEnum: Copy + 'static {
    /// Every member, in match-priority order
    const ALL: &'static [Self];

    /// Canonical lowercase name
    fn as_str(&self) -> &'static str;
}

/// Map `value` onto a member of `T`, returning `default` when nothing matches.
#[must_use]
pub fn parse_enum<T: FuzzyEnum>(value: &str, default: T) -> T {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return default;
    }

    T::ALL
        .iter()
        .find(|member| member.as_str() == value)
        .or_else(|| T::ALL.iter().find(|member| value.starts_with(member.as_str())))
        .or_else(|| T::ALL.iter().find(|member| value.contains(member.as_str())))
        .copied()
        .unwrap_or(default)
}
