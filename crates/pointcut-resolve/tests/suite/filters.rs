use pointcut_resolve::{AtSpec, Mode, ResolveError, Shift, SliceSpec};
use pretty_assertions::assert_eq;

use super::{Env, FOO};

fn foo() -> AtSpec {
    AtSpec::new("INVOKE").with_target(FOO)
}

fn no_match(blamed: &str) -> Result<Vec<pointcut_resolve::MatchResult>, ResolveError> {
    Err(ResolveError::NoMatch {
        blamed_filter: Some(blamed.to_string()),
    })
}

#[test]
fn ordinal_picks_one_candidate() {
    let env = Env::new();
    let all = env.all(&foo(), "calls");
    assert_eq!(all.len(), 5);

    let third = env.all(&foo().with_ordinal(2), "calls");
    assert_eq!(third.len(), 1);
    assert_eq!(third[0], all[2]);

    assert_eq!(
        env.resolve_in(&foo().with_ordinal(10), "calls", Mode::All),
        no_match("ordinal")
    );
}

#[test]
fn first_is_the_head_of_all() {
    let env = Env::new();
    for at in [foo(), foo().with_ordinal(3), AtSpec::new("RETURN")] {
        for method in ["calls", "mixed", "tail"] {
            let all = env.resolve_in(&at, method, Mode::All);
            let first = env.resolve_in(&at, method, Mode::First);
            match (all, first) {
                (Ok(all), Ok(first)) => {
                    assert_eq!(first.len(), 1);
                    assert_eq!(first[0], all[0]);
                }
                (Err(all), Err(first)) => assert_eq!(first, all),
                (all, first) => panic!("modes disagree in {method}: {all:?} vs {first:?}"),
            }
        }
    }
}

#[test]
fn zero_shift_is_the_identity() {
    let env = Env::new();
    let plain = env.all(&foo(), "calls");
    let shifted = env.all(&foo().with_shift(Shift::By(0)), "calls");
    assert_eq!(shifted, plain);
}

#[test]
fn shift_moves_the_result_but_keeps_the_original() {
    let env = Env::new();
    let plain = env.all(&foo(), "calls");
    let after = env.all(&foo().with_shift(Shift::After), "calls");
    let before = env.all(&foo().with_shift(Shift::Before), "calls");
    assert_eq!((after.len(), before.len()), (5, 5));
    for ((plain, after), before) in plain.iter().zip(&after).zip(&before) {
        assert_eq!(after.original, plain.insn);
        assert_eq!(after.insn.index(), plain.insn.index() + 1);
        assert_eq!(before.insn.index(), plain.insn.index() - 1);
    }
}

#[test]
fn shifting_off_either_end_drops_the_result() {
    let env = Env::new();
    let head = AtSpec::new("HEAD").with_shift(Shift::By(-1_000));
    assert_eq!(env.resolve_in(&head, "tail", Mode::All), no_match("shift"));

    let tail = AtSpec::new("TAIL").with_shift(Shift::By(1_000));
    assert_eq!(env.resolve_in(&tail, "tail", Mode::All), no_match("shift"));
}

fn slice(from: Option<AtSpec>, to: Option<AtSpec>) -> SliceSpec {
    SliceSpec {
        id: "calls".into(),
        from,
        to,
    }
}

#[test]
fn slice_narrows_the_candidates() {
    let env = Env::new();
    let all = env.all(&foo(), "calls");

    let middle = foo().with_slice(slice(
        Some(foo().with_ordinal(1)),
        Some(foo().with_ordinal(3)),
    ));
    let found = env.all(&middle, "calls");
    assert_eq!(found, all[1..=3].to_vec());

    let open_start = foo().with_slice(slice(None, Some(foo().with_ordinal(1))));
    assert_eq!(env.all(&open_start, "calls"), all[..=1].to_vec());

    let open_end = foo().with_slice(slice(Some(foo().with_ordinal(4)), None));
    assert_eq!(env.all(&open_end, "calls"), all[4..].to_vec());
}

#[test]
fn ordinal_counts_within_the_slice() {
    let env = Env::new();
    let all = env.all(&foo(), "calls");
    let at = foo()
        .with_slice(slice(Some(foo().with_ordinal(2)), None))
        .with_ordinal(0);
    assert_eq!(env.all(&at, "calls"), vec![all[2].clone()]);
}

#[test]
fn unresolved_slice_bound_rejects_everything() {
    let env = Env::new();
    let log = AtSpec::new("INVOKE").with_target("Lcom/example/Target;log(Ljava/lang/String;)V");
    let at = foo().with_slice(slice(Some(log), None));
    assert_eq!(env.resolve_in(&at, "calls", Mode::All), no_match("slice"));
}

#[test]
fn completion_ignores_ordinal_and_shift() {
    let env = Env::new();
    let at = foo().with_ordinal(10).with_shift(Shift::By(-1_000));
    let found = env
        .resolve_in(&at, "calls", Mode::Completion)
        .expect("completion never fails to match");
    assert_eq!(found.len(), 5);
    assert!(found.iter().all(|result| result.insn == result.original));
}
