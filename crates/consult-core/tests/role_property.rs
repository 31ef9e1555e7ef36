use proptest::prelude::*;
use teleconsult_core::{resolve_role, NegotiationRole};
use teleconsult_signaling_core::{DeclaredRole, Participant};

fn declared_role() -> impl Strategy<Value = DeclaredRole> {
    prop_oneof![
        Just(DeclaredRole::Doctor),
        Just(DeclaredRole::Patient),
        Just(DeclaredRole::Admin),
        Just(DeclaredRole::Unknown),
    ]
}

proptest! {
    #[test]
    fn exactly_one_initiator_per_pair(
        id_a in "[a-z0-9-]{1,12}",
        id_b in "[a-z0-9-]{1,12}",
        role_a in declared_role(),
        role_b in declared_role(),
    ) {
        prop_assume!(id_a != id_b);
        let a = Participant::new(id_a, role_a).present();
        let b = Participant::new(id_b, role_b).present();

        let ra = resolve_role(&a, &[b.clone()]).unwrap();
        let rb = resolve_role(&b, &[a.clone()]).unwrap();
        prop_assert_ne!(ra, rb);

        if role_a == DeclaredRole::Doctor && role_b != DeclaredRole::Doctor {
            prop_assert_eq!(ra, NegotiationRole::Initiator);
        }
    }

    #[test]
    fn resolution_ignores_presence_order_and_self(
        id_a in "[a-z]{1,8}",
        id_b in "[a-z]{1,8}",
        role_a in declared_role(),
        role_b in declared_role(),
    ) {
        prop_assume!(id_a != id_b);
        let a = Participant::new(id_a, role_a).present();
        let b = Participant::new(id_b, role_b).present();

        let alone_first = resolve_role(&a, &[a.clone(), b.clone()]);
        let peer_first = resolve_role(&a, &[b.clone(), a.clone()]);
        prop_assert_eq!(alone_first, peer_first);
        prop_assert_eq!(alone_first, resolve_role(&a, &[b]));
    }
}
