//! The stable diagnostic code inventory.
//!
//! Codes are grouped by hundred-band. Editor-side features (filtering,
//! quick-fix wiring, documentation links) key off these strings, so existing
//! codes are never renumbered; new checks take the next free slot in their
//! band.

// CK30xx: syntax / brace matching
pub const STRAY_CLOSING_BRACE: &str = "CK3001";
pub const UNCLOSED_BRACE: &str = "CK3002";
pub const UNTERMINATED_STRING: &str = "CK3003";
pub const NESTING_TOO_DEEP: &str = "CK3004";

// CK31xx: unknown commands and command/context mismatches
pub const UNKNOWN_TRIGGER: &str = "CK3101";
pub const UNKNOWN_EVENT: &str = "CK3102";
pub const UNKNOWN_EFFECT: &str = "CK3103";

// CK32xx: scope-chain validity
pub const UNKNOWN_SCOPE_LINK: &str = "CK3201";
pub const LINK_NOT_VALID_FOR_SCOPE: &str = "CK3202";
pub const UNDEFINED_SAVED_SCOPE: &str = "CK3203";

// CK33xx: style
// Brace problems carry a style-band twin next to the CK30xx syntax code:
// editors filter the bands independently, so both fire per event.
pub const UNCLOSED_BRACE_STYLE: &str = "CK3330";
pub const STRAY_CLOSING_BRACE_STYLE: &str = "CK3331";
pub const REDUNDANT_ALWAYS_YES: &str = "CK3332";
pub const IMPOSSIBLE_ALWAYS_NO: &str = "CK3333";
pub const MERGED_IDENTIFIERS: &str = "CK3345";

// CK34xx: namespace, portrait, theme, option fields
pub const DUPLICATE_EVENT_ID: &str = "CK3404";
pub const EVENT_ID_OUTSIDE_NAMESPACE: &str = "CK3405";
pub const UNKNOWN_THEME: &str = "CK3441";
pub const UNKNOWN_ANIMATION: &str = "CK3450";

// CK35xx: trigger_if semantics and scope-timing
pub const TRIGGER_IF_WITHOUT_LIMIT: &str = "CK3510";
pub const TRIGGER_ELSE_WITHOUT_IF: &str = "CK3511";
pub const MULTIPLE_TRIGGER_ELSE: &str = "CK3512";
pub const SCOPE_TIMING_TRIGGER: &str = "CK3550";
pub const SCOPE_TIMING_DESC: &str = "CK3551";
pub const SCOPE_TIMING_PORTRAIT: &str = "CK3552";
pub const VARIABLE_TIMING: &str = "CK3553";

// CK36xx: localization
pub const MISSING_LOC_KEY: &str = "CK3600";
pub const LOC_MISSING_LANGUAGE: &str = "CK3601";
pub const LOC_MISSING_BOM: &str = "CK3602";
pub const LOC_MALFORMED_LINE: &str = "CK3603";

// CK37xx: event structure
pub const MULTIPLE_IMMEDIATE: &str = "CK3760";
pub const MULTIPLE_AFTER: &str = "CK3761";
pub const HIDDEN_EVENT_WITH_OPTIONS: &str = "CK3762";
pub const EVENT_WITHOUT_DESC: &str = "CK3763";

// CK38xx: effect/trigger context
pub const EFFECT_IN_TRIGGER: &str = "CK3870";
pub const TRIGGER_IN_EFFECT: &str = "CK3871";
pub const TRIGGER_WRONG_SCOPE: &str = "CK3872";
pub const EFFECT_WRONG_SCOPE: &str = "CK3873";
pub const OPINION_INLINE_VALUE: &str = "CK3874";
pub const DIRECT_SCOPE_COMPARISON: &str = "CK3875";

// CK39xx: iterator misuse
pub const ITERATOR_WRONG_CONTEXT: &str = "CK3976";
pub const ITERATOR_INVALID_LIST: &str = "CK3977";
pub const RANDOM_WITHOUT_LIMIT: &str = "CK3978";
pub const EVERY_WITHOUT_LIMIT: &str = "CK3979";

// SCHEMA-xxx: schema-driven generic validation
pub const SCHEMA_REQUIRED_MISSING: &str = "SCHEMA-001";
pub const SCHEMA_TYPE_MISMATCH: &str = "SCHEMA-002";
pub const SCHEMA_ENUM_MISMATCH: &str = "SCHEMA-003";
pub const SCHEMA_PATTERN_MISMATCH: &str = "SCHEMA-004";
pub const SCHEMA_DUPLICATE_FORBIDDEN: &str = "SCHEMA-005";
pub const SCHEMA_DUPLICATE_SHADOWED: &str = "SCHEMA-006";
pub const SCHEMA_FIELD_ORDER: &str = "SCHEMA-007";
pub const SCHEMA_RANGE_INVALID: &str = "SCHEMA-008";
pub const SCHEMA_RULE_VIOLATION: &str = "SCHEMA-009";
pub const SCHEMA_DEPRECATED_FIELD: &str = "SCHEMA-010";
pub const SCHEMA_UNKNOWN_FIELD: &str = "SCHEMA-023";

// STORY-xxx: story cycle schema
pub const STORY_TIMING_CONFLICT: &str = "STORY-004";

/// Internal-failure diagnostic (analysis timeout, contained panic).
pub const INTERNAL: &str = "CK-internal";
