// Machines declared with `fsm!` and driven through the generated API.

hsmc_macro::fsm! {
    name: door,
    events: [open, close],
    initial: closed,
    state closed {
        entry: lock;
        on open [guard allowed] => opened;
        on open [guard !allowed] [action deny];
    }
    state opened {
        exit: beep;
        on close => final [action done];
    }
}

#[derive(Debug, Default)]
struct Log {
    calls: Vec<&'static str>,
    allowed: bool,
    jammed: bool,
}

fn callbacks() -> door::Callbacks<Log, (), &'static str> {
    door::Callbacks::<Log, (), &'static str> {
        action_lock: |fsm, _| {
            fsm.data_mut().calls.push("lock");
            Ok(())
        },
        action_beep: |fsm, _| {
            if fsm.data().jammed {
                return Err("jammed");
            }
            fsm.data_mut().calls.push("beep");
            Ok(())
        },
        condition_allowed: |fsm, _| Ok(fsm.data().allowed),
        action_deny: |fsm, _| {
            fsm.data_mut().calls.push("deny");
            Ok(())
        },
        action_done: |fsm, _| {
            fsm.data_mut().calls.push("done");
            Ok(())
        },
    }
}

#[test]
fn generated_types_follow_declaration_order() {
    assert_eq!(door::NUM_STATE, 2);
    assert_eq!(door::NUM_EVENT, 2);
    assert_eq!(door::State::opened.ordinal(), 1);
    assert_eq!(door::State::opened.id(), "opened");
    assert_eq!(door::Event::from_ordinal(0), Some(door::Event::open));
    assert_eq!(door::Event::from_ordinal(2), None);
}

#[test]
fn guard_picks_a_branch_and_final_terminates() {
    let cb = callbacks();
    let mut fsm = door::Fsm::new(&cb, Log::default());
    assert!(fsm.state().is_none());

    fsm.init(&()).unwrap();
    assert_eq!(fsm.state(), Some(door::State::closed));

    fsm.inject_open(&()).unwrap();
    assert_eq!(fsm.state(), Some(door::State::closed));

    fsm.data_mut().allowed = true;
    fsm.inject(door::Event::open, &()).unwrap();
    assert_eq!(fsm.state(), Some(door::State::opened));

    fsm.inject_close(&()).unwrap();
    assert!(fsm.is_terminated());
    assert_eq!(fsm.state(), None);

    fsm.inject_open(&()).unwrap();
    fsm.inject_close(&()).unwrap();
    assert_eq!(fsm.into_data().calls, ["lock", "deny", "beep", "done"]);
}

#[test]
fn callback_errors_stop_the_chain() {
    let cb = callbacks();
    let mut fsm = door::Fsm::new(
        &cb,
        Log {
            allowed: true,
            jammed: true,
            ..Log::default()
        },
    );
    fsm.init(&()).unwrap();
    fsm.inject_open(&()).unwrap();
    assert_eq!(fsm.inject_close(&()), Err("jammed"));
    assert_eq!(fsm.data().calls, ["lock"]);
}
