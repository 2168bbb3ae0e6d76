use reconciler::{
    AsyncChildIter, AsyncChildSource, Child, ChildIter, ContainerId, ContextId, ContextRead,
    DefaultHost, Deferred, Diagnostic, Element, Flags, Lanes, Lazy, NodeId, NodeTag, PassContext,
    PendingProps, Portal, ReconcileError, ReconcileOutcome, ReconcilerConfig, RenderTree, RootId,
    reconcile_children,
};
use std::rc::Rc;

struct Fixture {
    tree: RenderTree,
    pass: PassContext,
    root: RootId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    fn with_config(config: ReconcilerConfig) -> Self {
        let mut tree = RenderTree::new();
        let root = tree.create_root(ContainerId(1));
        Self {
            tree,
            pass: PassContext::with_config(config, Lanes::DEFAULT),
            root,
        }
    }

    fn render(&mut self, children: Child) -> (NodeId, ReconcileOutcome) {
        let current = self.tree.root_current(self.root).expect("root");
        let wip = self
            .tree
            .create_work_in_progress(current, PendingProps::Children(Rc::new(children.clone())))
            .expect("wip root");
        let outcome = reconcile_children(
            &mut self.tree,
            &DefaultHost,
            &mut self.pass,
            wip,
            &children,
            Lanes::DEFAULT,
        )
        .expect("reconcile");
        (wip, outcome)
    }

    fn commit(&mut self, wip: NodeId) {
        self.tree.commit_root(self.root, wip).expect("commit");
    }

    fn render_and_commit(&mut self, children: Child) -> NodeId {
        let (wip, outcome) = self.render(children);
        assert!(outcome.is_ready(), "unexpected outcome {outcome:?}");
        self.commit(wip);
        wip
    }

    fn labels(&self, parent: NodeId) -> Vec<String> {
        self.tree.children(parent).map(|id| self.tree[id].label()).collect()
    }

    fn placed(&self, parent: NodeId) -> Vec<String> {
        self.tree
            .children(parent)
            .filter(|id| self.tree[*id].flags().contains(Flags::PLACEMENT))
            .map(|id| self.tree[id].label())
            .collect()
    }

    fn deleted(&self, parent: NodeId) -> Vec<String> {
        self.tree[parent]
            .deletions()
            .iter()
            .map(|id| self.tree[*id].label())
            .collect()
    }
}

fn item(key: &str) -> Child {
    Element::host("li").keyed(key).into()
}

fn items(keys: &[&str]) -> Child {
    Child::list(keys.iter().map(|key| item(key)))
}

#[test]
fn keyed_list_reuses_survivors_and_places_new_tail() {
    let mut fx = Fixture::new();
    let first = fx.render_and_commit(items(&["a", "b", "c"]));
    let old: Vec<NodeId> = fx.tree.children(first).collect();

    let (wip, _) = fx.render(items(&["b", "c", "d"]));
    assert_eq!(fx.labels(wip), vec!["b", "c", "d"]);
    let next: Vec<NodeId> = fx.tree.children(wip).collect();
    assert_eq!(fx.tree[next[0]].alternate(), Some(old[1]));
    assert_eq!(fx.tree[next[1]].alternate(), Some(old[2]));
    assert!(fx.tree[next[2]].alternate().is_none());
    assert_eq!(fx.placed(wip), vec!["d"]);
    assert_eq!(fx.deleted(wip), vec!["a"]);
    assert!(fx.tree[wip].flags().contains(Flags::CHILD_DELETION));
}

// The high-water-mark rule keeps `c` in place and moves the items it passed.
#[test]
fn rotation_marks_items_behind_the_highest_reused_index() {
    let mut fx = Fixture::new();
    fx.render_and_commit(items(&["a", "b", "c"]));
    fx.pass.finish();

    let (wip, _) = fx.render(items(&["c", "a", "b"]));
    assert_eq!(fx.labels(wip), vec!["c", "a", "b"]);
    assert_eq!(fx.placed(wip), vec!["a", "b"]);
    assert!(fx.tree[wip].deletions().is_empty());
    assert_eq!(fx.pass.counters().placements, 2);
}

#[test]
fn moving_last_to_front_places_everything_after_it() {
    let mut fx = Fixture::new();
    fx.render_and_commit(items(&["a", "b", "c", "d"]));

    let (wip, _) = fx.render(items(&["a", "d", "b", "c"]));
    assert_eq!(fx.placed(wip), vec!["b", "c"]);
}

#[test]
fn type_change_at_same_position_replaces_the_node() {
    let mut fx = Fixture::new();
    let first = fx.render_and_commit(Element::host("span").into());
    let span = fx.tree[first].child().expect("span");

    let (wip, _) = fx.render(Element::host("div").into());
    let div = fx.tree[wip].child().expect("div");
    assert!(fx.tree[div].alternate().is_none());
    assert!(fx.tree[div].flags().contains(Flags::PLACEMENT));
    assert_eq!(fx.tree[wip].deletions(), &[span]);
}

#[test]
fn emptying_a_list_deletes_every_previous_child_in_order() {
    let mut fx = Fixture::new();
    let first = fx.render_and_commit(items(&["a", "b", "c", "d"]));
    let old: Vec<NodeId> = fx.tree.children(first).collect();

    let (wip, outcome) = fx.render(Child::Empty);
    assert!(matches!(outcome, ReconcileOutcome::Ready(None)));
    assert_eq!(fx.tree[wip].deletions(), old.as_slice());
}

#[test]
fn shrinking_to_a_middle_key_deletes_the_rest_in_previous_order() {
    let mut fx = Fixture::new();
    fx.render_and_commit(items(&["a", "b", "c", "d"]));

    let (wip, _) = fx.render(items(&["c"]));
    assert_eq!(fx.labels(wip), vec!["c"]);
    assert_eq!(fx.deleted(wip), vec!["a", "b", "d"]);
}

#[test]
fn committed_deletions_release_nodes_and_alternates() {
    let mut fx = Fixture::new();
    fx.render_and_commit(items(&["a", "b"]));
    fx.render_and_commit(items(&["a", "b"]));
    let live_before = fx.tree.len();

    let wip = fx.render_and_commit(items(&["a"]));
    assert_eq!(fx.labels(wip), vec!["a"]);
    // `b` and its alternate are gone; the root pair and `a` pair remain.
    assert_eq!(live_before - fx.tree.len(), 2);
}

#[test]
fn unkeyed_items_match_by_position() {
    let mut fx = Fixture::new();
    let first = fx.render_and_commit(Child::list([Element::host("p").into(), Element::host("p").into()]));
    let old: Vec<NodeId> = fx.tree.children(first).collect();

    let (wip, _) = fx.render(Child::list([Element::host("p").into()]));
    let kept = fx.tree[wip].child().expect("p");
    assert_eq!(fx.tree[kept].alternate(), Some(old[0]));
    assert_eq!(fx.tree[wip].deletions(), &[old[1]]);
}

#[test]
fn nested_lists_become_fragments() {
    let mut fx = Fixture::new();
    let wip = fx.render_and_commit(Child::list([item("a"), items(&["b", "c"])]));
    let children: Vec<NodeId> = fx.tree.children(wip).collect();
    assert_eq!(children.len(), 2);
    assert_eq!(fx.tree[children[1]].tag(), NodeTag::Fragment);
}

#[test]
fn iterators_reconcile_like_lists() {
    let mut fx = Fixture::new();
    fx.render_and_commit(items(&["a", "b"]));

    let (wip, _) = fx.render(Child::Iter(ChildIter::new(vec![item("b"), item("a")])));
    assert_eq!(fx.labels(wip), vec!["b", "a"]);
    assert_eq!(fx.placed(wip), vec!["a"]);
}

#[test]
fn iterators_replay_from_the_start_after_suspension() {
    let mut fx = Fixture::new();
    let gate = Deferred::<Child>::pending();
    let children = Child::Iter(ChildIter::new(vec![
        item("a"),
        Child::Deferred(gate.clone()),
        item("c"),
    ]));

    let (wip, outcome) = fx.render(children.clone());
    assert!(matches!(outcome, ReconcileOutcome::Suspended { .. }));
    fx.tree.discard_work_in_progress(wip);

    gate.resolve(item("b"));
    let (wip, outcome) = fx.render(children);
    assert!(outcome.is_ready());
    assert_eq!(fx.labels(wip), vec!["a", "b", "c"]);
}

#[test]
fn rerendering_the_same_iterator_keeps_its_children() {
    let mut fx = Fixture::new();
    let children = Child::Iter(ChildIter::new(vec![item("a"), item("b")]));
    fx.render_and_commit(children.clone());

    let (wip, _) = fx.render(children);
    assert_eq!(fx.labels(wip), vec!["a", "b"]);
    assert!(fx.tree[wip].deletions().is_empty());
    assert!(fx.placed(wip).is_empty());
}

#[test]
fn duplicate_keys_are_reported_and_rendered() {
    let mut fx = Fixture::new();
    let wip = fx.render_and_commit(items(&["a", "a"]));
    assert_eq!(fx.labels(wip), vec!["a", "a"]);
    let diagnostics = fx.pass.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(&diagnostics[0], Diagnostic::DuplicateKey { key, .. } if key.as_str() == "a"));
}

#[test]
fn missing_keys_are_reported_only_when_enabled() {
    let config = ReconcilerConfig {
        warn_on_missing_keys: true,
        ..ReconcilerConfig::default()
    };
    let mut fx = Fixture::with_config(config);
    fx.render_and_commit(Child::list([Element::host("p").into(), item("a")]));
    assert!(matches!(
        fx.pass.diagnostics(),
        [Diagnostic::MissingKey { index: 0, .. }]
    ));

    let mut quiet = Fixture::new();
    quiet.render_and_commit(Child::list([Element::host("p").into()]));
    assert!(quiet.pass.diagnostics().is_empty());
}

#[test]
fn callables_render_nothing_and_warn() {
    let mut fx = Fixture::new();
    let wip = fx.render_and_commit(Child::list([item("a"), Child::Callable("onClick".into())]));
    assert_eq!(fx.labels(wip), vec!["a"]);
    assert!(matches!(
        fx.pass.diagnostics(),
        [Diagnostic::CallableChild { name, .. }] if &**name == "onClick"
    ));
}

#[test]
fn callables_in_an_update_pass_warn_once() {
    let mut fx = Fixture::new();
    let children = Child::list([Child::Callable("onClick".into()), item("a")]);
    fx.render_and_commit(children.clone());
    fx.pass.take_diagnostics();

    let (wip, _) = fx.render(children);
    assert_eq!(fx.labels(wip), vec!["a"]);
    assert_eq!(fx.pass.diagnostics().len(), 1);
}

#[test]
fn text_children_render_strings_and_numbers() {
    let mut fx = Fixture::new();
    let wip = fx.render_and_commit(Child::list([Child::text("x"), Child::Number(3.0), Child::text("")]));
    let texts: Vec<Option<&str>> = fx.tree.children(wip).map(|id| fx.tree[id].text()).collect();
    assert_eq!(texts, vec![Some("x"), Some("3")]);
}

#[test]
fn portals_keep_their_container() {
    let mut fx = Fixture::new();
    let wip = fx.render_and_commit(Portal::new(ContainerId(9), item("a")).into());
    let portal = fx.tree[wip].child().expect("portal");
    assert_eq!(fx.tree[portal].tag(), NodeTag::Portal);
    assert_eq!(fx.tree[portal].container(), Some(ContainerId(9)));

    // A different container is a different portal.
    let (wip, _) = fx.render(Portal::new(ContainerId(10), item("a")).into());
    assert_eq!(fx.tree[wip].deletions(), &[portal]);
}

#[test]
fn context_reads_use_provider_or_default() {
    let mut fx = Fixture::new();
    let read = Child::Context(ContextRead::new(ContextId(1), "fallback"));

    let (wip, _) = fx.render(read.clone());
    let text = fx.tree[wip].child().expect("text");
    assert_eq!(fx.tree[text].text(), Some("fallback"));

    fx.pass.push_provider(ContextId(1), "provided");
    let (wip, _) = fx.render(read);
    let text = fx.tree[wip].child().expect("text");
    assert_eq!(fx.tree[text].text(), Some("provided"));
    fx.pass.pop_provider(ContextId(1));
}

#[test]
fn pending_deferred_suspends_and_replays_after_resolution() {
    let mut fx = Fixture::new();
    let gate = Deferred::<Child>::pending();
    let children = Child::list([item("a"), Child::Deferred(gate.clone())]);

    let (wip, outcome) = fx.render(children.clone());
    let ReconcileOutcome::Suspended { placeholder, wakeable } = outcome else {
        panic!("expected suspension, got {outcome:?}");
    };
    assert_eq!(fx.tree[placeholder].tag(), NodeTag::Pending);
    assert_eq!(fx.labels(wip), vec!["#pending"]);
    assert!(wakeable.is_for(&gate));
    assert!(!wakeable.is_settled());
    assert_eq!(fx.pass.tracked_deferreds(), 1);
    fx.tree.discard_work_in_progress(wip);

    gate.resolve(item("b"));
    assert!(wakeable.is_settled());
    let (wip, outcome) = fx.render(children);
    assert!(outcome.is_ready());
    assert_eq!(fx.labels(wip), vec!["a", "b"]);
    assert_eq!(fx.pass.tracked_deferreds(), 0);
}

#[test]
fn suspension_keeps_previous_children_scheduled_for_deletion() {
    let mut fx = Fixture::new();
    let first = fx.render_and_commit(items(&["a", "b"]));
    let old: Vec<NodeId> = fx.tree.children(first).collect();

    let (wip, outcome) = fx.render(Child::Deferred(Deferred::pending()));
    assert!(matches!(outcome, ReconcileOutcome::Suspended { .. }));
    assert_eq!(fx.tree[wip].deletions(), old.as_slice());
}

#[test]
fn rejected_deferred_becomes_an_error_placeholder() {
    let mut fx = Fixture::new();
    let (wip, outcome) = fx.render(Child::Deferred(Deferred::rejected("offline")));
    let ReconcileOutcome::Errored { placeholder, error } = outcome else {
        panic!("expected error, got {outcome:?}");
    };
    assert_eq!(error, ReconcileError::Rejected("offline".into()));
    assert_eq!(fx.tree[wip].child(), Some(placeholder));
    assert_eq!(fx.tree[placeholder].tag(), NodeTag::Throw);
    assert_eq!(fx.pass.tracked_deferreds(), 0);
}

#[test]
fn lazy_children_resolve_once_settled() {
    let mut fx = Fixture::new();
    let payload = Deferred::<Child>::pending();
    let lazy = Child::Lazy(Lazy {
        payload: payload.clone(),
    });

    let (wip, outcome) = fx.render(lazy.clone());
    assert!(matches!(outcome, ReconcileOutcome::Suspended { .. }));
    fx.tree.discard_work_in_progress(wip);

    payload.resolve(item("a"));
    let (wip, outcome) = fx.render(lazy);
    assert!(outcome.is_ready());
    assert_eq!(fx.labels(wip), vec!["a"]);
}

struct Steps(Vec<Deferred<Option<Child>>>);

impl AsyncChildSource for Steps {
    fn step(&self, index: usize) -> Deferred<Option<Child>> {
        self.0
            .get(index)
            .cloned()
            .unwrap_or_else(|| Deferred::fulfilled(None))
    }
}

#[test]
fn async_sequences_replay_settled_steps_in_order() {
    let mut fx = Fixture::new();
    let second = Deferred::pending();
    let source = Steps(vec![Deferred::fulfilled(Some(item("a"))), second.clone()]);
    let children = Child::AsyncIter(AsyncChildIter::new(source));

    let (wip, outcome) = fx.render(children.clone());
    assert!(matches!(outcome, ReconcileOutcome::Suspended { .. }));
    assert_eq!(fx.pass.tracked_deferreds(), 2);
    fx.tree.discard_work_in_progress(wip);

    second.resolve(Some(item("b")));
    let (wip, outcome) = fx.render(children);
    assert!(outcome.is_ready());
    assert_eq!(fx.labels(wip), vec!["a", "b"]);
}

#[test]
fn opaque_children_fail_the_whole_level() {
    let mut fx = Fixture::new();
    let first = fx.render_and_commit(items(&["a"]));
    let old = fx.tree[first].child().expect("a");
    let live = fx.tree.len();

    let (wip, outcome) = fx.render(Child::list([item("a"), item("b"), Child::Opaque("{}".into())]));
    assert!(matches!(
        outcome,
        ReconcileOutcome::Errored {
            error: ReconcileError::InvalidChild { .. },
            ..
        }
    ));
    assert_eq!(fx.labels(wip), vec!["#throw"]);
    assert_eq!(fx.tree[wip].deletions(), &[old]);
    // Only the placeholder and the reused `a` alternate were added.
    assert_eq!(fx.tree.len(), live + 2);
}
