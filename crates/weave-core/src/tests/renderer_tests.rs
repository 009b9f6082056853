use super::*;
use crate::skeleton::SkeletonBuilder;
use crate::tree::MutationStats;
use crate::value::{Callback, Thunk};
use std::cell::RefCell;

fn strict() -> RenderConfig {
    RenderConfig::default().with_strict_pools(true)
}

fn mounted(config: RenderConfig) -> (Renderer, NodeId, UnitId) {
    let mut renderer = Renderer::new(config);
    let container = renderer.tree_mut().create_element("main");
    let root = renderer.mount(container).unwrap();
    (renderer, container, root)
}

fn build(builder: SkeletonBuilder) -> Rc<Skeleton> {
    Rc::new(builder.build().unwrap())
}

/// `<ul>${items}</ul>`
fn list_skeleton() -> Rc<Skeleton> {
    build(SkeletonBuilder::new().open("ul").content().close())
}

/// `<li>${label}</li>`
fn item_skeleton() -> Rc<Skeleton> {
    build(SkeletonBuilder::new().open("li").content().close())
}

fn template(skeleton: &Rc<Skeleton>, values: Vec<Value>) -> Value {
    Value::Template(Template::new(Rc::clone(skeleton), values))
}

fn strings(items: &[&str]) -> Value {
    Value::list(items.iter().map(|s| Value::from(*s)))
}

fn child_unit(renderer: &Renderer, slot: SlotRef, index: usize) -> UnitId {
    match renderer.slot_children(slot).unwrap()[index] {
        Child::Unit(unit) => unit,
        Child::Node(node) => panic!("expected a unit, found node {node}"),
    }
}

fn text_nodes(tree: &Tree, parent: NodeId) -> Vec<NodeId> {
    tree.children(parent)
        .into_iter()
        .filter(|node| tree.text(*node).is_some())
        .collect()
}

fn texts(tree: &Tree, parent: NodeId) -> Vec<String> {
    text_nodes(tree, parent)
        .into_iter()
        .filter_map(|node| tree.text(node).map(str::to_string))
        .collect()
}

/// Root rendering `<ul>` with a flat list of strings.
struct ListFixture {
    renderer: Renderer,
    root: UnitId,
    list: Rc<Skeleton>,
}

impl ListFixture {
    fn new(config: RenderConfig) -> Self {
        let (renderer, _, root) = mounted(config);
        Self {
            renderer,
            root,
            list: list_skeleton(),
        }
    }

    fn show(&mut self, items: &[&str]) -> MutationStats {
        let before = self.renderer.tree().stats();
        let value = template(&self.list, vec![strings(items)]);
        self.renderer.render(self.root, value).unwrap();
        self.renderer.tree().stats().since(&before)
    }

    fn list_unit(&self) -> UnitId {
        child_unit(&self.renderer, SlotRef::new(self.root, 0), 0)
    }

    fn ul(&self) -> NodeId {
        self.renderer.output_nodes(self.list_unit()).unwrap()[0]
    }

    fn text_nodes(&self) -> Vec<NodeId> {
        text_nodes(self.renderer.tree(), self.ul())
    }

    fn texts(&self) -> Vec<String> {
        texts(self.renderer.tree(), self.ul())
    }
}

#[test]
fn apple_banana_round_trip_reuses_units() {
    let mut f = ListFixture::new(strict());
    f.show(&["Apple", "Banana"]);
    assert_eq!(f.texts(), vec!["Apple", "Banana"]);
    let nodes = f.text_nodes();

    let swapped = f.show(&["Banana", "Apple"]);
    assert_eq!(f.text_nodes(), vec![nodes[1], nodes[0]]);
    assert_eq!(swapped.created, 0);

    let emptied = f.show(&[]);
    assert!(f.texts().is_empty());
    assert_eq!(emptied.cleared, 1);
    let holding = f.renderer.tree().holding();
    assert_eq!(f.renderer.tree().parent(nodes[0]), Some(holding));
    assert_eq!(f.renderer.tree().parent(nodes[1]), Some(holding));
    assert_eq!(
        f.renderer.detached_units(SlotRef::new(f.list_unit(), 0)).len(),
        2
    );

    let restored = f.show(&["Apple", "Banana"]);
    assert_eq!(f.text_nodes(), nodes);
    assert_eq!(restored.created, 0);
    assert!(f
        .renderer
        .detached_units(SlotRef::new(f.list_unit(), 0))
        .is_empty());
}

#[test]
fn equal_values_apply_without_mutations() {
    let (mut renderer, _, root) = mounted(strict());
    let row = build(
        SkeletonBuilder::new()
            .open("li")
            .attribute_value("class", &["row ", ""])
            .event("click")
            .content()
            .close(),
    );
    let callback = Callback::new(|_, _| {});
    let value = |label: &str| {
        Value::list([
            template(&row, vec!["a".into(), callback.clone().into(), label.into()]),
            template(&row, vec!["b".into(), callback.clone().into(), "fixed".into()]),
        ])
    };

    renderer.render(root, value("first")).unwrap();
    let before = renderer.tree().stats();
    renderer.render(root, value("first")).unwrap();
    assert_eq!(renderer.tree().stats().since(&before).total(), 0);
}

#[test]
fn reverse_keeps_node_identities() {
    let mut f = ListFixture::new(strict());
    f.show(&["A", "B", "C"]);
    let nodes = f.text_nodes();
    let delta = f.show(&["C", "B", "A"]);
    assert_eq!(f.text_nodes(), vec![nodes[2], nodes[1], nodes[0]]);
    assert_eq!(delta.created, 0);
    assert_eq!(delta.removed, 0);
    assert_eq!(delta.moved, 2);
}

#[test]
fn append_is_one_insert() {
    let mut f = ListFixture::new(strict());
    f.show(&["A", "B", "C"]);
    let delta = f.show(&["A", "B", "C", "D"]);
    assert_eq!(delta.inserted, 1);
    assert_eq!(delta.moved, 0);
    assert_eq!(delta.removed, 0);
    assert_eq!(f.texts(), vec!["A", "B", "C", "D"]);
}

#[test]
fn dropping_first_is_one_removal() {
    let mut f = ListFixture::new(strict());
    f.show(&["A", "B", "C", "D"]);
    let nodes = f.text_nodes();
    let delta = f.show(&["B", "C", "D"]);
    assert_eq!(delta.removed, 1);
    assert_eq!(delta.moved, 0);
    assert_eq!(delta.inserted, 0);
    assert_eq!(f.text_nodes(), nodes[1..].to_vec());
}

#[test]
fn changing_one_item_touches_only_that_unit() {
    let (mut renderer, _, root) = mounted(strict());
    let list = list_skeleton();
    let item = item_skeleton();
    let show = |renderer: &mut Renderer, labels: &[&str]| {
        let items = labels
            .iter()
            .map(|label| template(&item, vec![Value::from(*label)]))
            .collect::<Vec<_>>();
        renderer
            .render(root, template(&list, vec![Value::from(items)]))
            .unwrap();
    };

    show(&mut renderer, &["a", "b", "c"]);
    let list_unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let items: Vec<UnitId> = (0..3)
        .map(|i| child_unit(&renderer, SlotRef::new(list_unit, 0), i))
        .collect();
    let nodes: Vec<Vec<NodeId>> = items
        .iter()
        .map(|unit| renderer.output_nodes(*unit).unwrap())
        .collect();

    let before = renderer.tree().stats();
    show(&mut renderer, &["a", "B", "c"]);
    let delta = renderer.tree().stats().since(&before);

    assert_eq!(delta.created, 0);
    assert_eq!(delta.text_updates, 1);
    assert_eq!(delta.moved + delta.inserted + delta.removed, 0);
    for (index, unit) in items.iter().enumerate() {
        assert_eq!(child_unit(&renderer, SlotRef::new(list_unit, 0), index), *unit);
        assert_eq!(renderer.output_nodes(*unit).unwrap(), nodes[index]);
    }
    assert_eq!(renderer.tree().text_content(nodes[1][0]), "B");
}

#[test]
fn shrink_then_regrow_reuses_detached_units() {
    let mut f = ListFixture::new(strict());
    f.show(&["A", "B", "C"]);
    let nodes = f.text_nodes();
    let units = f.renderer.unit_count();

    f.show(&["A"]);
    assert_eq!(f.renderer.unit_count(), units);
    let regrow = f.show(&["A", "B", "C"]);
    assert_eq!(regrow.created, 0);
    assert_eq!(f.text_nodes(), nodes);
    assert_eq!(f.renderer.unit_count(), units);
}

#[test]
fn retention_evicts_oldest_detached_units() {
    let mut f = ListFixture::new(strict().with_detached_capacity(Some(1)));
    f.show(&["A", "B", "C"]);
    let nodes = f.text_nodes();
    let slot = SlotRef::new(f.list_unit(), 0);
    let c_unit = child_unit(&f.renderer, slot, 2);

    f.show(&[]);
    assert_eq!(f.renderer.detached_units(slot), vec![c_unit]);
    assert!(!f.renderer.tree().contains(nodes[0]));
    assert!(!f.renderer.tree().contains(nodes[1]));
    assert!(f.renderer.tree().contains(nodes[2]));
    // root, list, retained text
    assert_eq!(f.renderer.unit_count(), 3);
}

#[test]
fn template_arity_is_checked() {
    let (mut renderer, _, root) = mounted(strict());
    let item = item_skeleton();
    let err = renderer
        .render(root, template(&item, vec!["a".into(), "b".into()]))
        .unwrap_err();
    match err {
        RenderError::Arity {
            skeleton,
            expected,
            actual,
        } => {
            assert_eq!(skeleton, item.id());
            assert_eq!((expected, actual), (1, 2));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn root_takes_exactly_one_value() {
    let (mut renderer, _, root) = mounted(strict());
    assert!(matches!(
        renderer.apply_values(root, &[]),
        Err(RenderError::UnitArity { expected: 1, actual: 0, .. })
    ));
}

#[test]
fn comment_slots_consume_values() {
    let (mut renderer, container, root) = mounted(strict());
    let skeleton = build(
        SkeletonBuilder::new()
            .open("p")
            .comment_slot(2)
            .content()
            .close(),
    );
    renderer
        .render(
            root,
            template(&skeleton, vec![Value::Int(1), Value::Int(2), "shown".into()]),
        )
        .unwrap();
    assert_eq!(renderer.tree().text_content(container), "shown");
}

#[test]
fn event_slot_rejects_non_callables() {
    let (mut renderer, _, root) = mounted(strict());
    let button = build(SkeletonBuilder::new().open("button").event("click").close());
    let err = renderer
        .render(root, template(&button, vec!["nope".into()]))
        .unwrap_err();
    match err {
        RenderError::BindingType {
            context,
            expected,
            found,
            ..
        } => {
            assert!(context.contains("onclick"), "{context}");
            assert_eq!(expected, "callback");
            assert_eq!(found, "text");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn failed_creation_frees_the_new_unit() {
    let (mut renderer, _, root) = mounted(strict().with_detached_capacity(Some(0)));
    let button = build(SkeletonBuilder::new().open("button").event("click").close());
    let holding = renderer.tree().holding();
    for _ in 0..3 {
        assert!(renderer
            .render(root, template(&button, vec!["nope".into()]))
            .is_err());
        assert_eq!(renderer.unit_count(), 1);
        assert!(renderer.tree().children(holding).is_empty());
    }
    renderer.render(root, Value::Null).unwrap();
    assert_eq!(renderer.unit_count(), 1);
    assert!(renderer.tree().children(holding).is_empty());
}

/// `<ul>` of `<li onclick=${handler}>${label}</li>` rows.
struct RowFixture {
    renderer: Renderer,
    container: NodeId,
    root: UnitId,
    list: Rc<Skeleton>,
    row: Rc<Skeleton>,
    pick: Callback,
}

impl RowFixture {
    fn new() -> Self {
        let (renderer, container, root) = mounted(strict());
        Self {
            renderer,
            container,
            root,
            list: list_skeleton(),
            row: build(
                SkeletonBuilder::new()
                    .open("li")
                    .event("click")
                    .content()
                    .close(),
            ),
            pick: Callback::new(|_, _| {}),
        }
    }

    fn value(&self, rows: &[(Value, &str)]) -> Value {
        let items = rows
            .iter()
            .map(|(handler, label)| template(&self.row, vec![handler.clone(), Value::from(*label)]));
        template(&self.list, vec![Value::list(items)])
    }

    fn show(&mut self, rows: &[(Value, &str)]) -> Result<MutationStats, RenderError> {
        let before = self.renderer.tree().stats();
        let value = self.value(rows);
        self.renderer.render(self.root, value)?;
        Ok(self.renderer.tree().stats().since(&before))
    }

    fn picked(&self, label: &'static str) -> (Value, &'static str) {
        (self.pick.clone().into(), label)
    }

    fn rows_slot(&self) -> SlotRef {
        SlotRef::new(child_unit(&self.renderer, SlotRef::new(self.root, 0), 0), 0)
    }

    fn holding_len(&self) -> usize {
        let tree = self.renderer.tree();
        tree.children(tree.holding()).len()
    }
}

#[test]
fn binding_error_keeps_live_rows_claimable() {
    let mut f = RowFixture::new();
    let good = [f.picked("a"), f.picked("b")];
    f.show(&good).unwrap();
    let units = f.renderer.unit_count();
    let slot = f.rows_slot();
    let rows = f.renderer.slot_children(slot).unwrap().to_vec();

    let err = f
        .show(&[f.picked("a"), (Value::from("nope"), "b")])
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::BindingType {
            expected: "callback",
            ..
        }
    ));
    assert_eq!(f.renderer.unit_count(), units);
    assert_eq!(f.renderer.slot_children(slot).unwrap(), rows.as_slice());
    assert_eq!(f.holding_len(), 0);
    assert_eq!(f.renderer.tree().text_content(f.container), "ab");

    let recovered = f.show(&good).unwrap();
    assert_eq!(recovered.total(), 0);
    assert_eq!(f.renderer.slot_children(slot).unwrap(), rows.as_slice());
}

#[test]
fn failed_revival_returns_unit_to_detached_pool() {
    let mut f = RowFixture::new();
    let good = [f.picked("a"), f.picked("b")];
    f.show(&good).unwrap();
    f.show(&[f.picked("a")]).unwrap();
    let slot = f.rows_slot();
    let detached = f.renderer.detached_units(slot);
    assert_eq!(detached.len(), 1);
    let units = f.renderer.unit_count();
    let holding = f.holding_len();

    assert!(f.show(&[f.picked("a"), (Value::from("nope"), "x")]).is_err());
    assert_eq!(f.renderer.detached_units(slot), detached);
    assert_eq!(f.renderer.unit_count(), units);
    assert_eq!(f.holding_len(), holding);

    let recovered = f.show(&good).unwrap();
    assert_eq!(recovered.created, 0);
    assert_eq!(f.renderer.tree().text_content(f.container), "ab");
    assert_eq!(child_unit(&f.renderer, slot, 1), detached[0]);
    assert!(f.renderer.detached_units(slot).is_empty());
}

#[test]
fn arity_error_leaves_populated_list_untouched() {
    let mut f = ListFixture::new(strict());
    let item = item_skeleton();
    f.show(&["A", "B", "C"]);
    let units = f.renderer.unit_count();
    let nodes = f.text_nodes();

    let bad = template(
        &f.list,
        vec![Value::list([Value::from("A"), template(&item, vec![])])],
    );
    let err = f.renderer.render(f.root, bad).unwrap_err();
    assert!(matches!(
        err,
        RenderError::Arity {
            expected: 1,
            actual: 0,
            ..
        }
    ));
    assert_eq!(f.renderer.unit_count(), units);
    assert_eq!(f.text_nodes(), nodes);

    assert_eq!(f.show(&["A", "B", "C"]).total(), 0);
    assert_eq!(f.text_nodes(), nodes);
}

#[test]
fn content_slot_rejects_callbacks() {
    let (mut renderer, _, root) = mounted(strict());
    let err = renderer
        .render(root, Value::Callback(Callback::new(|_, _| {})))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::BindingType {
            expected: "content",
            found: "callback",
            ..
        }
    ));
}

#[test]
fn events_bubble_and_rebind_without_churn() {
    let (mut renderer, _, root) = mounted(strict());
    let row = build(
        SkeletonBuilder::new()
            .open("li")
            .event("click")
            .open("span")
            .content()
            .close()
            .close(),
    );
    let seen: Rc<RefCell<Vec<(Vec<Value>, NodeId)>>> = Rc::default();
    let log = Rc::clone(&seen);
    let callback = Callback::new(move |args, event| {
        log.borrow_mut()
            .push((args.to_vec(), event.current_target));
    });

    renderer
        .render(
            root,
            template(&row, vec![callback.bind([Value::Int(1)]).into(), "x".into()]),
        )
        .unwrap();
    let unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let li = renderer.output_nodes(unit).unwrap()[0];
    let span = renderer.tree().first_child(li).unwrap();
    let label = text_nodes(renderer.tree(), span)[0];

    assert!(renderer.dispatch_event(label, "click", Value::Null));
    assert_eq!(seen.borrow()[0].1, li);
    assert!(!renderer.dispatch_event(label, "keydown", Value::Null));

    let before = renderer.tree().stats();
    renderer
        .render(
            root,
            template(&row, vec![callback.bind([Value::Int(2)]).into(), "x".into()]),
        )
        .unwrap();
    assert_eq!(renderer.tree().stats().since(&before).listener_updates, 0);
    assert!(renderer.dispatch_event(label, "click", Value::Null));
    assert!(matches!(seen.borrow()[1].0.as_slice(), [Value::Int(2)]));

    let other = Callback::new(|_, _| {});
    let before = renderer.tree().stats();
    renderer
        .render(root, template(&row, vec![other.into(), "x".into()]))
        .unwrap();
    assert_eq!(renderer.tree().stats().since(&before).listener_updates, 2);

    renderer
        .render(root, template(&row, vec![Value::Null, "x".into()]))
        .unwrap();
    assert!(renderer.tree().listeners(li).is_empty());
    assert!(!renderer.dispatch_event(label, "click", Value::Null));
}

#[test]
fn attribute_slots_join_toggle_and_set_properties() {
    let (mut renderer, _, root) = mounted(strict());
    let button = build(
        SkeletonBuilder::new()
            .open("button")
            .attribute_value("class", &["btn ", " ", ""])
            .attribute_value("disabled", &["", ""])
            .close(),
    );
    let show = |renderer: &mut Renderer, kind: Value, disabled: Value| {
        renderer
            .render(
                root,
                template(
                    &button,
                    vec!["primary".into(), kind, disabled],
                ),
            )
            .unwrap();
    };

    show(
        &mut renderer,
        Value::list([Value::from("large"), Value::from("wide")]),
        true.into(),
    );
    let unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let node = renderer.output_nodes(unit).unwrap()[0];
    let tree = renderer.tree();
    assert_eq!(tree.attribute(node, "class"), Some("btn primary large wide"));
    assert_eq!(tree.attribute(node, "disabled"), Some(""));
    assert_eq!(tree.property(node, "disabled"), Some(&PropValue::Flag(true)));

    show(&mut renderer, Value::Null, false.into());
    let tree = renderer.tree();
    assert_eq!(tree.attribute(node, "class"), Some("btn primary "));
    assert_eq!(tree.attribute(node, "disabled"), None);
    assert_eq!(tree.property(node, "disabled"), Some(&PropValue::Flag(false)));
}

#[test]
fn attribute_slots_reject_templates() {
    let (mut renderer, _, root) = mounted(strict());
    let link = build(
        SkeletonBuilder::new()
            .open("a")
            .attribute_value("href", &["/", ""])
            .close(),
    );
    let nested = template(&item_skeleton(), vec!["x".into()]);
    let err = renderer
        .render(root, template(&link, vec![nested]))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::BindingType {
            found: "template",
            ..
        }
    ));
}

#[test]
fn whole_attribute_replaces_previous_set() {
    let (mut renderer, _, root) = mounted(strict());
    let div = build(SkeletonBuilder::new().open("div").whole_attribute().close());
    renderer
        .render(root, template(&div, vec![r#"id=main title="a b""#.into()]))
        .unwrap();
    let unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let node = renderer.output_nodes(unit).unwrap()[0];
    assert_eq!(renderer.tree().attribute(node, "title"), Some("a b"));

    renderer
        .render(root, template(&div, vec!["id=other".into()]))
        .unwrap();
    assert_eq!(renderer.tree().attribute(node, "id"), Some("other"));
    assert_eq!(renderer.tree().attribute(node, "title"), None);
}

#[test]
fn later_slots_apply_first() {
    let (mut renderer, _, root) = mounted(strict());
    let select = build(
        SkeletonBuilder::new()
            .open("select")
            .attribute_value("value", &["", ""])
            .content()
            .close(),
    );
    let order: Rc<RefCell<Vec<usize>>> = Rc::default();
    let (first, second) = (Rc::clone(&order), Rc::clone(&order));
    let selected = Value::thunk(move |scope| {
        first.borrow_mut().push(scope.slot);
        "b".into()
    });
    let options = Value::thunk(move |scope| {
        second.borrow_mut().push(scope.slot);
        strings(&["a", "b"])
    });
    renderer
        .render(root, template(&select, vec![selected, options]))
        .unwrap();
    assert_eq!(*order.borrow(), vec![1, 0]);

    let unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let node = renderer.output_nodes(unit).unwrap()[0];
    assert_eq!(
        renderer.tree().property(node, "value"),
        Some(&PropValue::Text("b".into()))
    );
}

fn nest(depth: usize) -> Value {
    if depth == 0 {
        Value::from("leaf")
    } else {
        Value::Thunk(Thunk::new(move |_| nest(depth - 1)))
    }
}

#[test]
fn thunks_unwrap_until_depth_limit() {
    let (mut renderer, container, root) = mounted(strict().with_max_thunk_depth(3));
    renderer.render(root, nest(3)).unwrap();
    assert_eq!(renderer.tree().text_content(container), "leaf");
    assert!(matches!(
        renderer.render(root, nest(4)),
        Err(RenderError::ThunkDepth { limit: 3 })
    ));
}

#[test]
fn external_nodes_are_placed_but_never_freed() {
    let mut f = ListFixture::new(strict().with_detached_capacity(Some(0)));
    let item = item_skeleton();
    let external = f.renderer.tree_mut().create_element("canvas");
    let wrapped = template(&item, vec![Value::Node(external)]);
    f.renderer
        .render(f.root, template(&f.list, vec![Value::list([wrapped])]))
        .unwrap();
    let li = f.renderer.tree().parent(external).unwrap();
    assert_eq!(f.renderer.tree().tag(li), Some("li"));

    f.show(&[]);
    assert!(f.renderer.tree().contains(external));
    assert_eq!(f.renderer.tree().parent(external), None);
    assert!(!f.renderer.tree().contains(li));
}

#[test]
fn repeated_external_node_is_placed_once() {
    let (mut renderer, container, root) = mounted(strict());
    let external = renderer.tree_mut().create_element("canvas");
    renderer
        .render(root, Value::list([Value::Node(external), Value::Node(external)]))
        .unwrap();
    let children = renderer.slot_children(SlotRef::new(root, 0)).unwrap();
    assert_eq!(children, &[Child::Node(external)]);
    assert_eq!(renderer.tree().parent(external), Some(container));
}

struct Upgrader;

impl Host for Upgrader {
    fn upgrade_placeholder(&mut self, tree: &mut Tree, placeholder: NodeId) -> Option<NodeId> {
        let tag = format!("{}-ready", tree.tag(placeholder)?);
        let real = tree.create_element(&tag);
        tree.set_attribute(real, "upgraded", "yes").ok()?;
        Some(real)
    }
}

#[test]
fn upgraded_placeholders_keep_their_slots() {
    let mut renderer = Renderer::with_host(strict(), Upgrader);
    let container = renderer.tree_mut().create_element("main");
    let root = renderer.mount(container).unwrap();
    let card = build(
        SkeletonBuilder::new()
            .open("section")
            .open_placeholder("x-card")
            .attribute_value("title", &["", ""])
            .content()
            .close()
            .close(),
    );
    renderer
        .render(root, template(&card, vec!["Hello".into(), "body".into()]))
        .unwrap();

    let unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let section = renderer.output_nodes(unit).unwrap()[0];
    let real = renderer.tree().first_child(section).unwrap();
    let tree = renderer.tree();
    assert_eq!(tree.tag(real), Some("x-card-ready"));
    assert_eq!(tree.attribute(real, "upgraded"), Some("yes"));
    assert_eq!(tree.attribute(real, "title"), Some("Hello"));
    assert_eq!(tree.text_content(real), "body");

    renderer
        .render(root, template(&card, vec!["Bye".into(), "next".into()]))
        .unwrap();
    assert_eq!(renderer.tree().attribute(real, "title"), Some("Bye"));
    assert_eq!(renderer.tree().text_content(real), "next");
}

#[test]
fn placeholder_at_template_root_moves_unit_boundary() {
    let mut renderer = Renderer::with_host(strict(), Upgrader);
    let container = renderer.tree_mut().create_element("main");
    let root = renderer.mount(container).unwrap();
    let widget = build(SkeletonBuilder::new().open_placeholder("x-widget").close());
    renderer.render(root, template(&widget, vec![])).unwrap();
    let unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let nodes = renderer.output_nodes(unit).unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(renderer.tree().tag(nodes[0]), Some("x-widget-ready"));
    assert_eq!(renderer.tree().parent(nodes[0]), Some(container));
}

#[test]
fn host_attribute_targets_root_container() {
    let (mut renderer, container, root) = mounted(strict());
    let themed = build(
        SkeletonBuilder::new()
            .host_attribute("data-theme", &["theme-", ""])
            .open("p")
            .close(),
    );
    renderer
        .render(root, template(&themed, vec!["dark".into()]))
        .unwrap();
    assert_eq!(
        renderer.tree().attribute(container, "data-theme"),
        Some("theme-dark")
    );
}

#[test]
fn direct_apply_invalidates_ancestor_exact_keys() {
    let (mut renderer, container, root) = mounted(strict());
    let list = list_skeleton();
    let item = item_skeleton();
    let value = template(&list, vec![Value::list([template(&item, vec!["a".into()])])]);
    renderer.render(root, value.clone()).unwrap();

    let list_unit = child_unit(&renderer, SlotRef::new(root, 0), 0);
    let item_unit = child_unit(&renderer, SlotRef::new(list_unit, 0), 0);
    renderer.apply_values(item_unit, &["z".into()]).unwrap();
    assert_eq!(renderer.tree().text_content(container), "z");

    renderer.render(root, value).unwrap();
    assert_eq!(renderer.tree().text_content(container), "a");
    assert_eq!(child_unit(&renderer, SlotRef::new(list_unit, 0), 0), item_unit);
}

#[test]
fn release_is_idempotent() {
    let mut f = ListFixture::new(strict());
    f.show(&["A", "B"]);
    let before = f.renderer.tree().stats();
    f.renderer.release(f.root).unwrap();
    f.renderer.release(f.root).unwrap();
    assert_eq!(f.renderer.tree().stats(), before);
    let again = f.show(&["A", "B"]);
    assert_eq!(again.total(), 0);
}

#[test]
fn repeated_apply_values_reuses_previous_pass() {
    let (mut renderer, container, root) = mounted(strict());
    let list = list_skeleton();
    let value = template(&list, vec![strings(&["A", "B", "C"])]);
    renderer.apply_values(root, &[value.clone()]).unwrap();
    let units = renderer.unit_count();

    let before = renderer.tree().stats();
    renderer.apply_values(root, &[value]).unwrap();
    assert_eq!(renderer.tree().stats().since(&before).total(), 0);
    assert_eq!(renderer.unit_count(), units);
    assert_eq!(renderer.tree().text_content(container), "ABC");
}

#[test]
fn multi_root_templates_move_as_one_range() {
    let (mut renderer, container, root) = mounted(strict());
    let pair = build(
        SkeletonBuilder::new()
            .open("dt")
            .content()
            .close()
            .open("dd")
            .content()
            .close(),
    );
    let entry = |k: &str, v: &str| template(&pair, vec![k.into(), v.into()]);
    renderer
        .render(root, Value::list([entry("a", "1"), entry("b", "2")]))
        .unwrap();
    let a = child_unit(&renderer, SlotRef::new(root, 0), 0);
    assert_eq!(renderer.output_nodes(a).unwrap().len(), 2);

    renderer
        .render(root, Value::list([entry("b", "2"), entry("a", "1")]))
        .unwrap();
    assert_eq!(renderer.tree().text_content(container), "b2a1");
    assert_eq!(child_unit(&renderer, SlotRef::new(root, 0), 1), a);
}

#[test]
fn journal_records_when_configured() {
    let mut f = ListFixture::new(strict().with_record_mutations(true));
    f.show(&["A"]);
    let journal = f.renderer.tree_mut().take_journal();
    assert!(journal
        .iter()
        .any(|m| matches!(m, crate::tree::Mutation::Create { .. })));
}
