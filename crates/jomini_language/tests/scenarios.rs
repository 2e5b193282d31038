//! End-to-end analysis scenarios over complete documents, exercising the
//! parser, schema registry, validator, generic rules, and scope engine as
//! one pipeline — the way the language server drives them.

use jomini_base::{codes, CancelToken, Severity};
use jomini_language::{
    analyze_document, parse, Catalog, SchemaRegistry, SymbolKind,
};
use jomini_language::symbols::{MapSymbols, NoSymbols, SymbolLookup};

fn run(source: &str, path: &str, symbols: &dyn SymbolLookup) -> jomini_language::AnalysisOutcome {
    let registry = SchemaRegistry::load_embedded().unwrap();
    let catalog = Catalog::embedded();
    let doc = parse(source);
    analyze_document(&doc, path, &registry, catalog, symbols, &CancelToken::new())
}

#[test]
fn scope_timing_violation_exact_diagnostic() {
    let source = r#"
namespace = my_mod
my_mod.1 = {
    hidden = yes
    trigger = {
        scope:t = { is_alive = yes }
    }
    immediate = {
        save_scope_as = t
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let timing: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::SCOPE_TIMING_TRIGGER)
        .collect();
    assert_eq!(timing.len(), 1, "exactly one CK3550: {:?}", outcome.diagnostics);
    assert_eq!(timing[0].severity, Severity::Error);
    assert_eq!(&source[timing[0].span.start..timing[0].span.end], "scope:t");
}

#[test]
fn variable_timing_violation_exact_diagnostic() {
    // The variable counterpart of the Golden Rule: `var:` read in phase 1,
    // first set in phase 3 of the same event.
    let source = r#"
namespace = my_mod
my_mod.20 = {
    hidden = yes
    trigger = {
        var:grudge >= 2
    }
    immediate = {
        set_variable = { name = grudge value = 3 }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let timing: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::VARIABLE_TIMING)
        .collect();
    assert_eq!(timing.len(), 1, "exactly one CK3553: {:?}", outcome.diagnostics);
    assert_eq!(timing[0].severity, Severity::Error);
    assert_eq!(&source[timing[0].span.start..timing[0].span.end], "var:grudge");
}

#[test]
fn variable_read_in_later_phase_is_fine() {
    // Phase 5 reads a phase-3 definition: no timing violation.
    let source = r#"
namespace = my_mod
my_mod.21 = {
    hidden = yes
    immediate = {
        set_variable = { name = grudge value = 3 }
    }
    option = {
        name = my_mod.21.a
        trigger = {
            var:grudge >= 2
        }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    assert!(
        !outcome
            .diagnostics
            .iter()
            .any(|d| d.code == codes::VARIABLE_TIMING),
        "{:?}",
        outcome.diagnostics
    );
}

#[test]
fn variable_timing_checked_in_portrait_phase() {
    // A phase-4 portrait read of a phase-5 definition violates the ordering.
    let source = r#"
namespace = my_mod
my_mod.22 = {
    hidden = yes
    left_portrait = {
        character = var:chosen_one
    }
    option = {
        name = my_mod.22.a
        set_variable = { name = chosen_one value = 1 }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let timing: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::VARIABLE_TIMING)
        .collect();
    assert_eq!(timing.len(), 1, "{:?}", outcome.diagnostics);
    assert_eq!(
        &source[timing[0].span.start..timing[0].span.end],
        "var:chosen_one"
    );
}

#[test]
fn iterator_misuse_single_emission() {
    let source = r#"
namespace = my_mod
my_mod.2 = {
    hidden = yes
    immediate = {
        any_vassal = {
            add_gold = 100
        }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let misuse: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::ITERATOR_WRONG_CONTEXT)
        .collect();
    assert_eq!(misuse.len(), 1, "{:?}", outcome.diagnostics);
    assert_eq!(misuse[0].severity, Severity::Error);
    // No second emission from the schema layer for the same misuse.
    assert!(
        !outcome.diagnostics.iter().any(|d| d.code.starts_with("SCHEMA-")
            && d.span == misuse[0].span),
        "schema validation must not double-report the iterator"
    );
}

#[test]
fn letter_event_missing_sender() {
    let source = r#"
namespace = my_mod
my_mod.3 = {
    type = letter_event
    title = my_mod.3.t
    desc = my_mod.3.desc
    option = { name = my_mod.3.a }
}
"#;
    let mut symbols = MapSymbols::new();
    for key in ["my_mod.3.t", "my_mod.3.desc", "my_mod.3.a"] {
        symbols.insert(SymbolKind::LocalizationKey, key);
    }
    let outcome = run(source, "events/test.txt", &symbols);
    let findings: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == "EVENT-003")
        .collect();
    assert_eq!(findings.len(), 1, "{:?}", outcome.diagnostics);
    assert_eq!(findings[0].severity, Severity::Error);
    assert_eq!(
        &source[findings[0].span.start..findings[0].span.end],
        "my_mod.3",
        "EVENT-003 anchors on the event entry"
    );
}

#[test]
fn story_cycle_timing_conflict() {
    let source = r#"
my_story = {
    on_setup = {
        save_scope_as = protagonist
    }
    effect_group = {
        days = 30
        months = 1
        chance = 40
        triggered_effect = {
            trigger = { exists = story_owner }
            effect = { end_story = yes }
        }
    }
}
"#;
    let outcome = run(source, "common/story_cycles/my_story.txt", &NoSymbols);
    let findings: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == "STORY-004")
        .collect();
    assert_eq!(findings.len(), 1, "{:?}", outcome.diagnostics);
    assert_eq!(findings[0].severity, Severity::Error);
    assert_eq!(
        &source[findings[0].span.start..findings[0].span.end],
        "months",
        "the second timing keyword is the offender"
    );
}

#[test]
fn redundant_and_impossible_triggers() {
    let source = r#"
namespace = t
t.1 = {
    hidden = yes
    trigger = { always = yes }
}
t.2 = {
    hidden = yes
    trigger = { always = no }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::REDUNDANT_ALWAYS_YES && d.severity == Severity::Info));
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::IMPOSSIBLE_ALWAYS_NO && d.severity == Severity::Warning));
}

#[test]
fn trigger_if_chain_rules() {
    let source = r#"
namespace = t
t.3 = {
    hidden = yes
    trigger = {
        trigger_if = {
            is_adult = yes
        }
        trigger_else = { is_alive = yes }
        trigger_else = { is_ruler = yes }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    assert!(
        outcome.diagnostics.iter().any(|d| d.code == codes::TRIGGER_IF_WITHOUT_LIMIT),
        "trigger_if without limit: {:?}",
        outcome.diagnostics
    );
    assert_eq!(
        outcome
            .diagnostics
            .iter()
            .filter(|d| d.code == codes::MULTIPLE_TRIGGER_ELSE)
            .count(),
        1,
        "second trigger_else flagged once"
    );
}

#[test]
fn trigger_else_without_if() {
    let source = r#"
namespace = t
t.4 = {
    hidden = yes
    trigger = {
        trigger_else = { is_alive = yes }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::TRIGGER_ELSE_WITHOUT_IF));
}

#[test]
fn opinion_inline_value_rejected() {
    let source = r#"
namespace = t
t.5 = {
    hidden = yes
    immediate = {
        add_opinion = {
            target = root
            opinion = 25
        }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let findings: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::OPINION_INLINE_VALUE)
        .collect();
    assert_eq!(findings.len(), 1, "{:?}", outcome.diagnostics);
    assert!(source[findings[0].span.start..findings[0].span.end].contains("opinion"));
}

#[test]
fn direct_scope_comparison_gets_fix() {
    let source = r#"
namespace = t
t.6 = {
    hidden = yes
    immediate = { save_scope_as = a }
    option = {
        trigger = {
            scope:a = scope:a
        }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let findings: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::DIRECT_SCOPE_COMPARISON)
        .collect();
    assert_eq!(findings.len(), 1, "{:?}", outcome.diagnostics);
    assert_eq!(findings[0].fixes.len(), 1);
    assert!(findings[0].fixes[0].replacement.contains("this"));
}

#[test]
fn hidden_event_with_option_warns() {
    let source = r#"
namespace = t
t.7 = {
    hidden = yes
    option = { name = t.7.a }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::HIDDEN_EVENT_WITH_OPTIONS && d.severity == Severity::Warning));
}

#[test]
fn scope_chain_errors_point_at_segment() {
    let source = r#"
namespace = t
t.8 = {
    hidden = yes
    trigger = {
        liege.primary_title.fleeb = { is_alive = yes }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let findings: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::UNKNOWN_SCOPE_LINK)
        .collect();
    assert_eq!(findings.len(), 1, "{:?}", outcome.diagnostics);
    assert_eq!(&source[findings[0].span.start..findings[0].span.end], "fleeb");
}

#[test]
fn link_valid_elsewhere_distinguished() {
    let source = r#"
namespace = t
t.9 = {
    hidden = yes
    trigger = {
        holder = { is_alive = yes }
    }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::LINK_NOT_VALID_FOR_SCOPE));
}

#[test]
fn parse_totality_on_garbage() {
    // Any byte soup terminates and produces a root block.
    let sources = [
        "{{{{{",
        "}}}}}",
        "= = = { } \" unterminated",
        "a = { b = { c = } } } {",
    ];
    let registry = SchemaRegistry::load_embedded().unwrap();
    let catalog = Catalog::embedded();
    for source in sources {
        let doc = parse(source);
        assert!(
            !doc.diagnostics.is_empty(),
            "malformed input must report: {source:?}"
        );
        // And the analysis pipeline survives it.
        let _ = analyze_document(
            &doc,
            "events/garbage.txt",
            &registry,
            catalog,
            &NoSymbols,
            &CancelToken::new(),
        );
    }

    // Non-ASCII junk terminates too; it is nonsense but brace-balanced.
    let doc = parse("🗡 = ⚔");
    assert_eq!(doc.root.entries.len(), 1);
}

#[test]
fn well_formed_parse_has_no_diagnostics() {
    let source = r#"
namespace = ok
ok.1 = {
    hidden = yes
    immediate = {
        if = {
            limit = { gold >= 100 }
            add_gold = -100
        }
    }
}
"#;
    let doc = parse(source);
    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
}

#[test]
fn range_correctness_for_every_entry() {
    // The source slice of each entry's key span re-parses to the key itself.
    let source = r#"
namespace = t
t.10 = {
    type = character_event
    title = t.10.t
    desc = t.10.desc
    trigger = { is_adult = yes gold >= 50 }
    immediate = { every_child = { limit = { is_alive = yes } add_trait = brave } }
    option = { name = t.10.a add_prestige = 10 }
}
"#;
    let doc = parse(source);
    fn check(block: &jomini_language::Block, source: &str) {
        for entry in &block.entries {
            assert_eq!(
                &source[entry.key_span.start..entry.key_span.end],
                entry.key,
                "key span must slice to the key"
            );
            assert!(entry.span.start <= entry.key_span.start);
            assert!(entry.span.end >= entry.value.span().end);
            if let jomini_language::Value::Block(inner) = &entry.value {
                check(inner, source);
            }
        }
    }
    check(&doc.root, source);
}

#[test]
fn diagnostics_are_stable_sorted() {
    let source = r#"
namespace = t
t.11 = {
    trigger = { add_gold = 1 }
    immediate = { bogus_effect = yes }
    option = { }
}
"#;
    let outcome = run(source, "events/test.txt", &NoSymbols);
    let mut sorted = outcome.diagnostics.clone();
    sorted.sort_by(|a, b| {
        (a.span.start, a.span.end, a.code.as_str()).cmp(&(b.span.start, b.span.end, b.code.as_str()))
    });
    assert_eq!(outcome.diagnostics, sorted, "published order is the stable sort");
}
