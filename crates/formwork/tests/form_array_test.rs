#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Tests for ordered composites: sequence operations, graceful bounds,
//! identity-based membership and structural revalidation scope.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use formwork::array::{ArrayOptions, FormArray};
use formwork::control::{Control, ControlRef};
use formwork::event::{validator, ValidationEvent};
use formwork::field::{FieldOptions, FormControl};
use formwork::group::{FormGroup, GroupOptions};
use formwork::validators::required_validator;
use serde_json::json;

fn item(value: &str) -> FormControl<String> {
    FormControl::new(
        value.to_string(),
        FieldOptions::default().with_validator(required_validator("required")),
    )
}

fn counted_item(value: &str, runs: &Arc<AtomicUsize>) -> FormControl<String> {
    let counter = Arc::clone(runs);
    FormControl::new(
        value.to_string(),
        FieldOptions::default().with_validator(validator(move |_c: FormControl<String>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        })),
    )
}

// ── sequence operations ──

#[tokio::test]
async fn push_and_pop_update_membership_and_validity() {
    let array = FormArray::new(vec![item("a")], ArrayOptions::default());
    array.wait().await;
    assert_eq!(array.len(), 1);
    assert!(array.valid());

    array.push(item(""));
    array.wait().await;
    assert_eq!(array.len(), 2);
    assert!(!array.valid());

    let popped = array.pop().expect("non-empty");
    assert_eq!(popped.peek_value(), "");
    array.wait().await;
    assert_eq!(array.len(), 1);
    assert!(array.valid());
}

#[tokio::test]
async fn shift_and_unshift_work_at_the_head() {
    let array = FormArray::new(vec![item("b")], ArrayOptions::default());
    array.unshift(item("a"));
    array.wait().await;
    assert_eq!(array.get_value(), json!(["a", "b"]));

    let head = array.shift().expect("non-empty");
    assert_eq!(head.peek_value(), "a");
    assert_eq!(array.get_value(), json!(["b"]));

    let empty: FormArray<FormControl<String>> = FormArray::new(vec![], ArrayOptions::default());
    assert!(empty.shift().is_none());
    assert!(empty.pop().is_none());
}

#[tokio::test]
async fn remove_at_out_of_range_is_a_graceful_no_op() {
    let array = FormArray::new(vec![item("a"), item("b")], ArrayOptions::default());
    array.wait().await;

    array.remove_at(5);
    array.wait().await;
    assert_eq!(array.len(), 2);
    assert!(array.valid());

    array.remove_at(1);
    array.wait().await;
    assert_eq!(array.get_value(), json!(["a"]));
}

#[tokio::test]
async fn splice_clamps_and_returns_the_removed_run() {
    let array = FormArray::new(
        vec![item("a"), item("b"), item("c"), item("d")],
        ArrayOptions::default(),
    );

    let removed = array.splice(1, 2, vec![item("x")]);
    let removed_values: Vec<_> = removed.iter().map(|c| c.peek_value()).collect();
    assert_eq!(removed_values, ["b", "c"]);
    assert_eq!(array.get_value(), json!(["a", "x", "d"]));

    // Start and delete count both clamp to the valid range.
    let removed = array.splice(10, 10, vec![item("tail")]);
    assert!(removed.is_empty());
    assert_eq!(array.get_value(), json!(["a", "x", "d", "tail"]));
}

#[tokio::test]
async fn insert_at_places_without_deleting() {
    let array = FormArray::new(vec![item("a"), item("c")], ArrayOptions::default());
    array.insert_at(1, item("b"));
    assert_eq!(array.get_value(), json!(["a", "b", "c"]));

    array.insert_at(99, item("z"));
    assert_eq!(array.get_value(), json!(["a", "b", "c", "z"]));
}

#[tokio::test]
async fn swap_exchanges_positions_and_ignores_bad_indices() {
    let array = FormArray::new(vec![item("a"), item("b"), item("c")], ArrayOptions::default());
    array.swap(0, 2);
    assert_eq!(array.get_value(), json!(["c", "b", "a"]));

    array.swap(0, 9);
    array.swap(7, 8);
    assert_eq!(array.get_value(), json!(["c", "b", "a"]));
}

// ── identity-based membership ──

#[tokio::test]
async fn index_of_and_remove_follow_identity_not_value() {
    let first = item("same");
    let second = item("same");
    let outsider = item("same");
    let array = FormArray::new(vec![first.clone(), second.clone()], ArrayOptions::default());

    assert_eq!(array.index_of(&first), Some(0));
    assert_eq!(array.index_of(&second), Some(1));
    assert_eq!(array.index_of(&outsider), None);

    assert!(array.remove(&first));
    assert!(!array.remove(&first));
    assert!(!array.remove(&outsider));
    assert_eq!(array.index_of(&second), Some(0));
    assert_eq!(array.len(), 1);
}

#[tokio::test]
async fn iteration_is_a_snapshot_unaffected_by_mutation() {
    let array = FormArray::new(vec![item("a"), item("b")], ArrayOptions::default());
    let mut seen = Vec::new();
    for child in array.iter() {
        // Mutating mid-iteration affects the live array, not this walk.
        array.push(item("late"));
        seen.push(child.peek_value());
    }
    assert_eq!(seen, ["a", "b"]);
    assert_eq!(array.len(), 4);
}

#[tokio::test]
async fn map_and_some_walk_the_current_children() {
    let array = FormArray::new(vec![item("a"), item("")], ArrayOptions::default());
    let values = array.map(|c| c.peek_value());
    assert_eq!(values, ["a", ""]);
    assert!(array.some(|c| c.peek_value().is_empty()));
    assert!(!array.some(|c| c.peek_value() == "zzz"));
}

// ── revalidation scope ──

#[tokio::test]
async fn structural_mutation_does_not_revalidate_unaffected_children() {
    let runs = Arc::new(AtomicUsize::new(0));
    let array = FormArray::new(
        vec![counted_item("a", &runs), counted_item("b", &runs)],
        ArrayOptions::default(),
    );
    array.wait().await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    array.push(counted_item("c", &runs));
    array.wait().await;
    // Only the newcomer validated; the settled children were left alone.
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    array.remove_at(0);
    array.wait().await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn array_level_validators_rerun_on_structural_and_child_changes() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let array = FormArray::new(
        vec![item("a")],
        ArrayOptions::default().with_validator(validator(
            move |a: FormArray<FormControl<String>>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if a.is_empty() {
                        Ok(vec![ValidationEvent::error("minItems", "at least one item")])
                    } else {
                        Ok(Vec::new())
                    }
                }
            },
        )),
    );
    array.wait().await;
    assert!(array.valid());
    let after_init = runs.load(Ordering::SeqCst);

    array.remove_at(0);
    array.wait().await;
    assert!(!array.valid());
    assert!(runs.load(Ordering::SeqCst) > after_init);

    array.push(item("b"));
    array.wait().await;
    assert!(array.valid());
    let after_push = runs.load(Ordering::SeqCst);

    // A child value change bubbles up and re-runs the array's own validators.
    array.get(0).expect("present").set_value("changed".into());
    array.wait().await;
    assert!(runs.load(Ordering::SeqCst) > after_push);
}

// ── value and error reporting ──

#[tokio::test]
async fn array_value_and_errors_nest_under_indexed_paths() {
    let items = FormArray::new(vec![item("a"), item(""), item("c")], ArrayOptions::default());
    let form = FormGroup::new(
        [("items", Arc::new(items.clone()) as ControlRef)],
        GroupOptions::default(),
    );
    form.wait().await;

    assert_eq!(form.get_value(), json!({ "items": ["a", "", "c"] }));
    assert!(!form.valid());

    let report = form.get_all_errors();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].path, "items[1]");
    assert_eq!(report[0].errors[0].key.as_deref(), Some("required"));
}
