use pointcut_resolve::MemberSelector;
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 256;

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_$]{0,8}"
}

fn arb_owner() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..4).prop_map(|segments| segments.join("/"))
}

fn arb_field_desc() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("I".to_string()),
        Just("[J".to_string()),
        arb_owner().prop_map(|owner| format!("L{owner};")),
    ]
}

fn arb_method_desc() -> impl Strategy<Value = String> {
    (prop::collection::vec(arb_field_desc(), 0..3), prop_oneof![Just("V".to_string()), arb_field_desc()])
        .prop_map(|(args, ret)| format!("({}){ret}", args.concat()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn method_selectors_round_trip(
        owner in arb_owner(),
        name in arb_segment(),
        desc in arb_method_desc(),
    ) {
        let text = format!("L{owner};{name}{desc}");
        let selector = MemberSelector::parse(&text).expect("well-formed selector");
        prop_assert_eq!(selector.owner.as_deref(), Some(owner.as_str()));
        prop_assert_eq!(selector.name.as_deref(), Some(name.as_str()));
        prop_assert_eq!(selector.desc.as_deref(), Some(desc.as_str()));
        prop_assert!(selector.matches(&owner, &name, &desc));
        prop_assert_eq!(selector.to_string(), text);
    }

    #[test]
    fn dotted_owners_parse_like_internal_ones(
        owner in arb_owner(),
        name in arb_segment(),
        desc in arb_field_desc(),
    ) {
        let dotted = format!("{}.{name}:{desc}", owner.replace('/', "."));
        let internal = format!("L{owner};{name}:{desc}");
        prop_assert_eq!(MemberSelector::parse(&dotted), MemberSelector::parse(&internal));
    }

    #[test]
    fn whitespace_is_ignored(
        owner in arb_owner(),
        name in arb_segment(),
        desc in arb_method_desc(),
    ) {
        let text = format!("L{owner};{name}{desc}");
        let spaced = format!(" L{owner}; {name} {desc} ");
        prop_assert_eq!(MemberSelector::parse(&spaced), MemberSelector::parse(&text));
    }

    #[test]
    fn parsing_is_pure(text in "[ -~]{0,24}") {
        prop_assert_eq!(MemberSelector::parse(&text), MemberSelector::parse(&text));
    }
}
