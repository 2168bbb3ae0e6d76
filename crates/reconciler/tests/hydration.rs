use reconciler::test_harness::{MarkupDocument, PassReport, WorkLoop};
use reconciler::{
    Child, ContainerId, Element, Flags, HydrationConfig, HydrationMismatch, Lanes, MarkupParent,
    MismatchRetry, NodeTag, Portal, ReconcileError, is_fully_matched,
};

const CONTAINER: ContainerId = ContainerId(1);
const TOP: MarkupParent = MarkupParent::Container(CONTAINER);

fn effects(report: &PassReport) -> Vec<String> {
    report.effects.iter().map(ToString::to_string).collect()
}

fn hydrate(
    work: &mut WorkLoop,
    children: impl Into<Child>,
    doc: &MarkupDocument,
    config: HydrationConfig,
) -> PassReport {
    let (report, state) = work
        .hydrate(children, doc, config, Lanes::DEFAULT)
        .expect("hydrate");
    assert!(!state.is_hydrating(), "hydration must end at the root");
    report
}

#[test]
fn matching_markup_is_adopted_without_effects() {
    let mut doc = MarkupDocument::new();
    let div = doc.append(TOP, "div").expect("div");
    let span = doc.append(MarkupParent::Node(div), "span").expect("span");
    let text = doc.append(MarkupParent::Node(span), "#hi").expect("text");

    let mut work = WorkLoop::new(CONTAINER);
    let tree = Element::host("div").with_children(Element::host("span").with_children("hi"));
    let report = hydrate(&mut work, tree, &doc, HydrationConfig::default());
    assert!(report.recoverable.is_empty());
    assert!(effects(&report).is_empty());
    work.commit(&report).expect("commit");

    let div_node = work.find(&[0]).expect("div node");
    let span_node = work.find(&[0, 0]).expect("span node");
    let text_node = work.find(&[0, 0, 0]).expect("text node");
    assert_eq!(work.tree[div_node].markup(), Some(div));
    assert_eq!(work.tree[span_node].markup(), Some(span));
    assert_eq!(work.tree[text_node].markup(), Some(text));
    assert!(is_fully_matched(&work.tree, div_node));
}

#[test]
fn element_names_match_case_insensitively() {
    let mut doc = MarkupDocument::new();
    let div = doc.append(TOP, "DIV").expect("div");

    let mut work = WorkLoop::new(CONTAINER);
    let report = hydrate(&mut work, Element::host("div"), &doc, HydrationConfig::default());
    work.commit(&report).expect("commit");
    let node = work.find(&[0]).expect("div node");
    assert_eq!(work.tree[node].markup(), Some(div));
}

#[test]
fn empty_markup_falls_back_to_insertion() {
    let doc = MarkupDocument::new();
    let mut work = WorkLoop::new(CONTAINER);
    let report = hydrate(&mut work, Element::host("div"), &doc, HydrationConfig::default());

    assert_eq!(effects(&report), vec!["place div"]);
    assert!(matches!(
        report.recoverable.as_slice(),
        [HydrationMismatch::MissingMarkup { .. }]
    ));
    assert!(work.tree[report.finished].flags().contains(Flags::HYDRATION_DIVERGED));
    let div = work.tree[report.finished].child().expect("div");
    assert!(!work.tree[div].flags().contains(Flags::HYDRATING));
}

#[test]
fn mismatch_retries_the_next_sibling_once() {
    let mut doc = MarkupDocument::new();
    doc.append(TOP, "p").expect("p");
    let div = doc.append(TOP, "div").expect("div");

    let mut work = WorkLoop::new(CONTAINER);
    let report = hydrate(&mut work, Element::host("div"), &doc, HydrationConfig::default());
    assert_eq!(effects(&report), vec!["delete #markup"]);
    let node = work.tree[report.finished].child().expect("div node");
    assert_eq!(work.tree[node].markup(), Some(div));
    assert!(work.tree[node].flags().contains(Flags::HYDRATING));
}

#[test]
fn retry_can_be_disabled() {
    let mut doc = MarkupDocument::new();
    let p = doc.append(TOP, "p").expect("p");

    let config = HydrationConfig {
        retry: MismatchRetry::Off,
        ..HydrationConfig::default()
    };
    let mut work = WorkLoop::new(CONTAINER);
    let report = hydrate(&mut work, Element::host("div"), &doc, config);
    assert_eq!(effects(&report), vec!["delete #markup", "place div"]);
    assert!(matches!(
        report.recoverable.as_slice(),
        [HydrationMismatch::UnmatchedMarkup { handle, .. }] if *handle == p
    ));
}

#[test]
fn siblings_after_an_inserted_node_resume_at_the_same_cursor() {
    let mut doc = MarkupDocument::new();
    let b = doc.append(TOP, "b").expect("b");

    let config = HydrationConfig {
        retry: MismatchRetry::Off,
        ..HydrationConfig::default()
    };
    let mut work = WorkLoop::new(CONTAINER);
    let children = Child::list([Element::host("a").into(), Element::host("b").into()]);
    let report = hydrate(&mut work, children, &doc, config);
    assert_eq!(effects(&report), vec!["place a"]);
    let second = work.tree.children(report.finished).nth(1).expect("b node");
    assert_eq!(work.tree[second].markup(), Some(b));
}

#[test]
fn leftover_markup_inside_a_host_is_deleted() {
    let mut doc = MarkupDocument::new();
    let ul = doc.append(TOP, "ul").expect("ul");
    doc.append(MarkupParent::Node(ul), "li").expect("li");
    doc.append(MarkupParent::Node(ul), "li").expect("li");

    let mut work = WorkLoop::new(CONTAINER);
    let report = hydrate(
        &mut work,
        Element::host("ul").with_children(vec![Element::host("li")]),
        &doc,
        HydrationConfig::default(),
    );
    assert_eq!(effects(&report), vec!["delete #markup"]);
    let ul_node = work.tree[report.finished].child().expect("ul node");
    assert!(work.tree[ul_node].flags().contains(Flags::HYDRATION_DIVERGED));
    assert!(!is_fully_matched(&work.tree, ul_node));

    let live = work.tree.len();
    work.commit(&report).expect("commit");
    assert_eq!(work.tree.len(), live - 1, "markup placeholder is released at commit");
}

#[test]
fn text_mismatch_is_patched_and_reported() {
    let mut doc = MarkupDocument::new();
    let p = doc.append(TOP, "p").expect("p");
    doc.append(MarkupParent::Node(p), "#old").expect("text");

    let mut work = WorkLoop::new(CONTAINER);
    let report = hydrate(
        &mut work,
        Element::host("p").with_children("new"),
        &doc,
        HydrationConfig::default(),
    );
    assert_eq!(effects(&report), vec!["update #text(new)"]);
    assert!(matches!(
        report.recoverable.as_slice(),
        [HydrationMismatch::TextContent { found: Some(found), .. }] if found == "old"
    ));
}

#[test]
fn strict_mode_turns_mismatches_into_errors() {
    let doc = MarkupDocument::new();
    let config = HydrationConfig {
        strict: true,
        ..HydrationConfig::default()
    };
    let mut work = WorkLoop::new(CONTAINER);
    let result = work.hydrate(Element::host("div"), &doc, config, Lanes::DEFAULT);
    assert!(matches!(
        result,
        Err(ReconcileError::Hydration(HydrationMismatch::MissingMarkup { .. }))
    ));
    let current = work.current_root().expect("root");
    assert!(work.tree[current].child().is_none(), "nothing was committed");
}

#[test]
fn portal_contents_are_never_matched() {
    let mut doc = MarkupDocument::new();
    let div = doc.append(TOP, "div").expect("div");

    let mut work = WorkLoop::new(CONTAINER);
    let children = Child::list([
        Portal::new(ContainerId(2), Element::host("span")).into(),
        Element::host("div").into(),
    ]);
    let report = hydrate(&mut work, children, &doc, HydrationConfig::default());
    assert!(report.recoverable.is_empty());

    let portal = work.tree.children(report.finished).next().expect("portal");
    assert_eq!(work.tree[portal].tag(), NodeTag::Portal);
    let span = work.tree[portal].child().expect("span");
    assert!(work.tree[span].markup().is_none());
    let div_node = work.tree.children(report.finished).nth(1).expect("div node");
    assert_eq!(work.tree[div_node].markup(), Some(div));
}

#[test]
fn hydrated_tree_updates_like_any_other() {
    let mut doc = MarkupDocument::new();
    let ul = doc.append(TOP, "ul").expect("ul");
    doc.append(MarkupParent::Node(ul), "li").expect("li");

    let mut work = WorkLoop::new(CONTAINER);
    let first = Element::host("ul").with_children(vec![Element::host("li").keyed("a")]);
    let report = hydrate(&mut work, first, &doc, HydrationConfig::default());
    work.commit(&report).expect("commit");

    let next = Element::host("ul").with_children(vec![
        Element::host("li").keyed("a"),
        Element::host("li").keyed("b"),
    ]);
    let report = work.render_and_commit(next, Lanes::DEFAULT).expect("update");
    assert_eq!(effects(&report), vec!["place b"]);
}
