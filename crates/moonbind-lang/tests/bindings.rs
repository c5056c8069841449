//! Native type binding tests.
//!
//! Tests the embedding surface end to end: TypeRegistry → apply_registry →
//! instantiate → execute. Native state is inspected through ObjectRef
//! handles after script runs.

use std::cell::Cell;
use std::rc::Rc;

use moonbind_lang::{
    Base, BindingError, ErrorCode, Member, RuntimeConfig, RuntimeManager, ScriptError, TypeRegistry,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ElementNode {
    pointless_bool: bool,
    name: String,
    depth: i32,
}

#[derive(Default)]
struct ButtonNode {
    element: ElementNode,
    clicks: i64,
}

struct Tracked {
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

fn element_registry() -> TypeRegistry<ElementNode> {
    let mut reg = TypeRegistry::new("ElementNode");
    reg.register_field("PointlessBool", |n: &mut ElementNode| &mut n.pointless_bool).unwrap();
    reg.register_field("Name", |n: &mut ElementNode| &mut n.name).unwrap();
    reg.register_field("Depth", |n: &mut ElementNode| &mut n.depth).unwrap();
    reg.register_method("SayHello", |frame| {
        let name = frame.with_userdata(1, |n: &mut ElementNode| n.name.clone())?;
        frame.context().write_line(format!("hello from '{name}'"));
        Ok(0)
    })
    .unwrap();
    reg.register_method("SetPointlessBool", |frame| {
        let value = frame.to_boolean(2);
        frame.with_userdata(1, |n: &mut ElementNode| n.pointless_bool = value)?;
        Ok(0)
    })
    .unwrap();
    reg.register_method("Add", |frame| {
        let a = frame.check_integer(2)?;
        let b = frame.check_integer(3)?;
        frame.push(a + b);
        Ok(1)
    })
    .unwrap();
    reg.register_free_function("SaySomething", |frame| {
        let text = frame.check_string(1)?;
        frame.context().write_line(format!("something: {text}"));
        Ok(0)
    })
    .unwrap();
    reg
}

fn button_registry(base: &TypeRegistry<ElementNode>) -> TypeRegistry<ButtonNode> {
    let mut reg = TypeRegistry::with_bases(
        "ButtonNode",
        vec![Base::of(base, |b: &mut ButtonNode| &mut b.element)],
    );
    reg.register_field("Clicks", |b: &mut ButtonNode| &mut b.clicks).unwrap();
    reg.register_method("Click", |frame| {
        frame.with_userdata(1, |b: &mut ButtonNode| b.clicks += 1)?;
        Ok(0)
    })
    .unwrap();
    reg
}

fn tracked_registry(drops: &Rc<Cell<usize>>) -> TypeRegistry<Tracked> {
    let drops = drops.clone();
    TypeRegistry::with_factory("Tracked", Vec::new(), move || Tracked { drops: drops.clone() })
}

fn manager() -> RuntimeManager {
    RuntimeManager::with_config(RuntimeConfig::default().with_capture_output(true))
}

/// Manager with `ElementNode` installed and one instance bound to `node`.
fn with_node() -> (RuntimeManager, moonbind_lang::ObjectRef<ElementNode>) {
    let mut rt = manager();
    let reg = element_registry();
    rt.apply_registry(&reg).unwrap();
    let node = rt.instantiate(&reg).unwrap();
    rt.set_global("node").unwrap();
    (rt, node)
}

fn exec(rt: &mut RuntimeManager, src: &str) -> Vec<String> {
    rt.execute(src).unwrap_or_else(|e| panic!("execute failed: {e}"));
    rt.take_output()
}

fn exec_err(rt: &mut RuntimeManager, src: &str) -> moonbind_lang::RuntimeError {
    match rt.execute(src) {
        Err(ScriptError::Runtime(e)) => e,
        Err(ScriptError::Compile(errs)) => panic!("unexpected compile errors: {errs:#?}"),
        Ok(()) => panic!("expected execute to fail but it succeeded"),
    }
}

// ─── Registration ────────────────────────────────────────────────────────────

#[test]
fn duplicate_member_is_rejected() {
    let mut reg = element_registry();
    let err = reg.register_method("Add", |_| Ok(0)).unwrap_err();
    assert_eq!(
        err,
        BindingError::DuplicateMember { type_name: "ElementNode".into(), member: "Add".into() }
    );
    assert!(reg.register_method("Subtract", |_| Ok(0)).is_ok());
}

#[test]
fn derived_lookup_finds_base_member_and_local_shadows() {
    let base = element_registry();
    let mut button = button_registry(&base);
    assert!(matches!(button.descriptor().find_named_member("PointlessBool"), Some(Member::Field(_))));
    assert!(matches!(
        button.descriptor().find_named_member("SayHello"),
        Some(Member::Method(m)) if m.name() == "SayHello"
    ));

    button.register_method("SayHello", |frame| {
        frame.context().write_line("button says hello".into());
        Ok(0)
    })
    .unwrap();
    let mut rt = manager();
    rt.apply_registry(&button).unwrap();
    rt.instantiate(&button).unwrap();
    rt.set_global("b").unwrap();
    assert_eq!(exec(&mut rt, "b:SayHello()"), vec!["button says hello"]);
}

#[test]
fn installing_same_name_twice_collides() {
    let mut rt = manager();
    let reg = element_registry();
    rt.apply_registry(&reg).unwrap();
    assert_eq!(
        rt.apply_registry(&reg),
        Err(BindingError::DescriptorCollision("ElementNode".into()))
    );
    let other = TypeRegistry::<ButtonNode>::new("ElementNode");
    assert!(matches!(rt.apply_registry(&other), Err(BindingError::DescriptorCollision(_))));
}

#[test]
fn installing_derived_type_seals_its_base() {
    let mut base = element_registry();
    let button = button_registry(&base);
    let mut rt = manager();
    rt.apply_registry(&button).unwrap();
    assert_eq!(
        base.register_method("Late", |_| Ok(0)),
        Err(BindingError::Sealed("ElementNode".into()))
    );
    assert_eq!(
        base.register_field("Late", |n: &mut ElementNode| &mut n.depth),
        Err(BindingError::Sealed("ElementNode".into()))
    );
    rt.instantiate(&button).unwrap();
    rt.set_global("b").unwrap();
    assert_eq!(exec_err(&mut rt, "print(b.Late)").code, ErrorCode::R002);
}

#[test]
fn type_name_cannot_shadow_existing_global() {
    let mut rt = manager();
    let shadow = TypeRegistry::<ElementNode>::new("print");
    assert_eq!(rt.apply_registry(&shadow), Err(BindingError::GlobalCollision("print".into())));
    assert!(!rt.context().has_type("print"));
    assert_eq!(exec(&mut rt, "print('still here')"), vec!["still here"]);

    exec(&mut rt, "Widget = 1");
    let widget = TypeRegistry::<ElementNode>::new("Widget");
    assert!(matches!(rt.apply_registry(&widget), Err(BindingError::GlobalCollision(_))));
}

#[test]
fn one_registry_installs_into_several_runtimes() {
    let reg = element_registry();
    let mut a = manager();
    let mut b = manager();
    a.apply_registry(&reg).unwrap();
    b.apply_registry(&reg).unwrap();
    assert_eq!(exec(&mut b, "print(ElementNode.Create():Add(1, 1))"), vec!["2"]);
}

#[test]
fn instantiate_before_install_fails() {
    let mut rt = manager();
    let reg = element_registry();
    assert!(matches!(rt.instantiate(&reg), Err(BindingError::NotInstalled(_))));
}

// ─── Fields ──────────────────────────────────────────────────────────────────

#[test]
fn boolean_field_round_trip() {
    let (mut rt, node) = with_node();
    assert_eq!(node.with(|n| n.pointless_bool), Some(false));
    assert_eq!(exec(&mut rt, "print(node.PointlessBool)"), vec!["false"]);
    exec(&mut rt, "node.PointlessBool = true");
    assert_eq!(node.with(|n| n.pointless_bool), Some(true));
}

#[test]
fn string_into_boolean_field_is_mismatch() {
    let (mut rt, node) = with_node();
    let e = exec_err(&mut rt, "node.PointlessBool = 'yes'");
    assert_eq!(e.code, ErrorCode::R003);
    assert_eq!(e.line, 1);
    assert_eq!(node.with(|n| n.pointless_bool), Some(false));
}

#[test]
fn out_of_range_integer_is_mismatch() {
    let (mut rt, node) = with_node();
    exec(&mut rt, "node.Depth = 12");
    let e = exec_err(&mut rt, "node.Depth = math.maxinteger");
    assert_eq!(e.code, ErrorCode::R003);
    assert_eq!(node.with(|n| n.depth), Some(12));
}

#[test]
fn string_field_from_native_and_script() {
    let mut rt = manager();
    let reg = element_registry();
    rt.apply_registry(&reg).unwrap();
    let node = rt
        .instantiate_with(&reg, ElementNode { name: "root".into(), ..ElementNode::default() })
        .unwrap();
    rt.set_global("node").unwrap();
    assert_eq!(exec(&mut rt, "node:SayHello() node.Name = node.Name .. '!'"), vec!["hello from 'root'"]);
    assert_eq!(node.with(|n| n.name.clone()), Some("root!".to_string()));
}

#[test]
fn missing_member_leaves_state_alone() {
    let (mut rt, node) = with_node();
    let e = exec_err(&mut rt, "print(node.Nope)");
    assert_eq!(e.code, ErrorCode::R002);
    assert_eq!(e.message, "failed to find key 'Nope'");
    let e = exec_err(&mut rt, "node.Nope = 1");
    assert_eq!(e.code, ErrorCode::R002);
    assert_eq!(node.with(|n| n.pointless_bool), Some(false));
    assert_eq!(exec(&mut rt, "print(node.PointlessBool)"), vec!["false"]);
}

#[test]
fn assigning_to_method_is_rejected() {
    let (mut rt, _node) = with_node();
    let e = exec_err(&mut rt, "node.SayHello = 1");
    assert_eq!(e.code, ErrorCode::R004);
    assert!(e.message.contains("cannot assign to method"));
}

// ─── Methods & free functions ────────────────────────────────────────────────

#[test]
fn method_calls_in_loop_print_in_order() {
    let (mut rt, _node) = with_node();
    let out = exec(&mut rt, "for i = 1, 10 do print(node:Add(i, 5)) end");
    let expected: Vec<String> = (6..=15).map(|n| n.to_string()).collect();
    assert_eq!(out, expected);
}

#[test]
fn method_mutates_native_state() {
    let (mut rt, node) = with_node();
    exec(&mut rt, "node:SetPointlessBool(true)");
    assert_eq!(node.with(|n| n.pointless_bool), Some(true));
}

#[test]
fn method_arguments_are_checked() {
    let (mut rt, _node) = with_node();
    let e = exec_err(&mut rt, "node:Add('x', 1)");
    assert_eq!(e.code, ErrorCode::R005);
    assert!(e.message.contains("bad argument #2 to 'Add'"), "{}", e.message);
}

#[test]
fn free_function_needs_no_instance() {
    let mut rt = manager();
    rt.apply_registry(&element_registry()).unwrap();
    assert_eq!(exec(&mut rt, "ElementNode.SaySomething('hi')"), vec!["something: hi"]);
}

#[test]
fn create_builds_default_instance() {
    let mut rt = manager();
    rt.apply_registry(&element_registry()).unwrap();
    let src = "local n = ElementNode.Create() print(type(n), n.PointlessBool) n:SetPointlessBool(true) print(n.PointlessBool)";
    assert_eq!(exec(&mut rt, src), vec!["userdata\tfalse", "true"]);
}

#[test]
fn pcall_observes_dispatch_errors() {
    let (mut rt, _node) = with_node();
    let src = r#"
        local ok, err = pcall(function() return node.Nope end)
        print(ok, err)
        print(pcall(function() node.PointlessBool = 3 end))
        print(node:Add(1, 2))
    "#;
    let out = exec(&mut rt, src);
    assert_eq!(out[0], "false\tfailed to find key 'Nope'");
    assert!(out[1].starts_with("false\ttype mismatch"), "{}", out[1]);
    assert_eq!(out[2], "3");
}

// ─── Inheritance ─────────────────────────────────────────────────────────────

#[test]
fn base_members_work_on_derived_instances() {
    let base = element_registry();
    let button = button_registry(&base);
    let mut rt = manager();
    rt.apply_registry(&button).unwrap();
    let b = rt.instantiate(&button).unwrap();
    rt.set_global("b").unwrap();

    let out = exec(&mut rt, r#"
        b.Name = "ok"
        b:SetPointlessBool(true)
        b:Click() b:Click()
        b:SayHello()
        print(b.PointlessBool, b.Clicks, b:Add(2, 2))
    "#);
    assert_eq!(out, vec!["hello from 'ok'", "true\t2\t4"]);
    assert_eq!(b.with(|b| (b.clicks, b.element.pointless_bool)), Some((2, true)));
}

#[test]
fn base_and_derived_installed_side_by_side() {
    let base = element_registry();
    let button = button_registry(&base);
    let mut rt = manager();
    rt.apply_registry(&base).unwrap();
    rt.apply_registry(&button).unwrap();
    let out = exec(&mut rt, "local e = ElementNode.Create() local b = ButtonNode.Create() b:Click() print(e:Add(1, 2), b.Clicks)");
    assert_eq!(out, vec!["3\t1"]);
    let e = exec_err(&mut rt, "ElementNode.Create().Clicks = 1");
    assert_eq!(e.code, ErrorCode::R002);
}

// ─── Lifetime ────────────────────────────────────────────────────────────────

#[test]
fn collection_finalizes_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    let reg = tracked_registry(&drops);
    let mut rt = manager();
    rt.apply_registry(&reg).unwrap();
    let obj = rt.instantiate(&reg).unwrap();
    rt.context_mut().pop();

    assert_eq!(rt.collect_garbage(), 1);
    assert_eq!(drops.get(), 1);
    assert!(!obj.is_alive());
    assert!(obj.with(|_| ()).is_none());

    assert_eq!(rt.collect_garbage(), 0);
    drop(rt);
    assert_eq!(drops.get(), 1);
}

#[test]
fn reachable_objects_survive_until_teardown() {
    let drops = Rc::new(Cell::new(0));
    let reg = tracked_registry(&drops);
    let mut rt = manager();
    rt.apply_registry(&reg).unwrap();
    let obj = rt.instantiate(&reg).unwrap();
    rt.set_global("keep").unwrap();

    assert_eq!(rt.collect_garbage(), 0);
    assert!(obj.is_alive());
    drop(rt);
    assert_eq!(drops.get(), 1);
    assert!(!obj.is_alive());
}

#[test]
fn script_collectgarbage_finalizes_dropped_objects() {
    let drops = Rc::new(Cell::new(0));
    let reg = tracked_registry(&drops);
    let mut rt = manager();
    rt.apply_registry(&reg).unwrap();
    exec(&mut rt, "local t = Tracked.Create() t = nil collectgarbage()");
    assert_eq!(drops.get(), 1);
    assert!(rt.context().heap().is_empty());
}

#[test]
fn threshold_triggers_automatic_collection() {
    let drops = Rc::new(Cell::new(0));
    let reg = tracked_registry(&drops);
    let config = RuntimeConfig::default()
        .with_capture_output(true)
        .with_gc_threshold(2 * size_of::<Tracked>());
    let mut rt = RuntimeManager::with_config(config);
    rt.apply_registry(&reg).unwrap();
    exec(&mut rt, "for i = 1, 10 do Tracked.Create() end");
    assert!(drops.get() > 0);
    drop(rt);
    assert_eq!(drops.get(), 10);
}
