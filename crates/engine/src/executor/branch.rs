use capflow_types::{OnFalse, Step};

/// Where the step loop goes after a step's condition evaluated false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
    /// Record the step as skipped and stop the run.
    Exit,
    /// Record the step as skipped and resume at this later index.
    SkipTo { index: usize, target: String },
    /// Record the step as skipped and advance by one.
    Skip,
}

/// Decides the false-condition branch for `steps[current]`.
///
/// A `skip-to` target resolves to the first step whose declared name matches, searching the whole
/// list. Positional `step-N` labels are not targets. Targets at or before `current`, and unknown
/// targets, degrade to [`Branch::Skip`].
pub fn on_false_branch(steps: &[Step], current: usize) -> Branch {
    let Some(policy) = steps.get(current).and_then(|step| step.on_false.as_ref()) else {
        return Branch::Skip;
    };
    match policy {
        OnFalse::Exit => Branch::Exit,
        OnFalse::SkipTo(target) => {
            let found = steps.iter().position(|step| step.name.as_deref() == Some(target.as_str()));
            match found {
                Some(index) if index > current => Branch::SkipTo {
                    index,
                    target: target.clone(),
                },
                _ => Branch::Skip,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_types::StepBody;

    fn step(name: Option<&str>, on_false: Option<OnFalse>) -> Step {
        Step {
            name: name.map(str::to_string),
            condition: Some("false".into()),
            on_false,
            body: StepBody::Gate,
        }
    }

    #[test]
    fn forward_skip_to_resolves_index() {
        let steps = vec![
            step(Some("a"), Some(OnFalse::SkipTo("d".into()))),
            step(Some("b"), None),
            step(Some("c"), None),
            step(Some("d"), None),
        ];
        assert_eq!(
            on_false_branch(&steps, 0),
            Branch::SkipTo {
                index: 3,
                target: "d".into()
            }
        );
    }

    #[test]
    fn backward_self_and_unknown_targets_skip_one_step() {
        let steps = vec![
            step(Some("a"), None),
            step(Some("b"), Some(OnFalse::SkipTo("a".into()))),
            step(Some("c"), Some(OnFalse::SkipTo("c".into()))),
            step(Some("d"), Some(OnFalse::SkipTo("nowhere".into()))),
        ];
        assert_eq!(on_false_branch(&steps, 1), Branch::Skip);
        assert_eq!(on_false_branch(&steps, 2), Branch::Skip);
        assert_eq!(on_false_branch(&steps, 3), Branch::Skip);
    }

    #[test]
    fn first_matching_name_wins() {
        // The earlier duplicate is behind the current step, so the later one is never chosen.
        let steps = vec![
            step(Some("dup"), None),
            step(Some("b"), Some(OnFalse::SkipTo("dup".into()))),
            step(Some("dup"), None),
        ];
        assert_eq!(on_false_branch(&steps, 1), Branch::Skip);
    }

    #[test]
    fn first_forward_duplicate_is_the_target() {
        let steps = vec![
            step(Some("a"), Some(OnFalse::SkipTo("dup".into()))),
            step(Some("dup"), None),
            step(Some("x"), None),
            step(Some("dup"), None),
        ];
        assert_eq!(
            on_false_branch(&steps, 0),
            Branch::SkipTo {
                index: 1,
                target: "dup".into()
            }
        );
    }

    #[test]
    fn positional_labels_are_not_targets() {
        let steps = vec![step(None, Some(OnFalse::SkipTo("step-3".into()))), step(None, None), step(None, None)];
        assert_eq!(on_false_branch(&steps, 0), Branch::Skip);
    }

    #[test]
    fn declared_name_wins_over_positional_label() {
        let steps = vec![
            step(Some("gate"), Some(OnFalse::SkipTo("step-3".into()))),
            step(Some("b"), None),
            step(None, None),
            step(Some("step-3"), None),
        ];
        assert_eq!(
            on_false_branch(&steps, 0),
            Branch::SkipTo {
                index: 3,
                target: "step-3".into()
            }
        );
    }

    #[test]
    fn exit_and_absent_policies() {
        let steps = vec![step(Some("a"), Some(OnFalse::Exit)), step(Some("b"), None)];
        assert_eq!(on_false_branch(&steps, 0), Branch::Exit);
        assert_eq!(on_false_branch(&steps, 1), Branch::Skip);
    }
}
