use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::derive::{Model, PersistEnum};
use crate::format::{BinaryWriter, FormatWriter, ObjectHeader};
use crate::{
    CustomReader, CustomSerialize, CustomWriter, Culture, Engine, Error, Format, Literal,
    MemberCache, MemberConverter, MemberHook, MemberValue, Model as _, Persist, Result,
    SerializationConfig, SerializationContext, Shared, SharedModel, TypeKey, UnresolvedTypePolicy,
    Value, ValueKind,
};

const FORMATS: [Format; 3] = [Format::Binary, Format::Json, Format::Xml];

fn bytes_of(engine: &Engine, model: &dyn crate::Model, format: Format) -> Vec<u8> {
    engine.to_bytes(model, format).unwrap()
}

fn text_of(engine: &Engine, model: &dyn crate::Model, format: Format) -> String {
    String::from_utf8(bytes_of(engine, model, format)).unwrap()
}

// -----------------------------------------------------------------------------
// Models

#[derive(PersistEnum, Default, Clone, Copy, PartialEq, Debug)]
enum Weekday {
    #[default]
    Monday,
    Tuesday,
    Wednesday,
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
struct Address {
    street: String,
    number: u16,
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
struct Person {
    name: String,
    age: u8,
    height: f64,
    initial: char,
    active: bool,
    balance: i64,
    tags: Vec<String>,
    address: Address,
    previous: Option<Address>,
    history: Vec<Address>,
    #[persist(enum_as_string)]
    day: Weekday,
    rest_day: Weekday,
    #[persist(exclude)]
    session: String,
}

fn ada() -> Person {
    Person {
        name: "Ada <Lovelace> & co".into(),
        age: 36,
        height: 1.85,
        initial: 'A',
        active: true,
        balance: -42,
        tags: vec!["math".into(), String::new(), "  padded  ".into()],
        address: Address {
            street: "St James's Square".into(),
            number: 12,
        },
        previous: None,
        history: vec![Address {
            street: "Marylebone".into(),
            number: 7,
        }],
        day: Weekday::Tuesday,
        rest_day: Weekday::Wednesday,
        session: "token-123".into(),
    }
}

#[derive(Model, Default, Clone)]
struct Node {
    label: String,
    next: Option<Shared<Node>>,
    children: Vec<Shared<Node>>,
}

fn node(label: &str) -> Shared<Node> {
    Shared::new(Node {
        label: label.into(),
        ..Node::default()
    })
}

// -----------------------------------------------------------------------------
// Round trip and exclusion

#[test]
fn round_trip_every_format() {
    let engine = Engine::builder().register::<Person>().build();
    let person = ada();

    for format in FORMATS {
        let bytes = bytes_of(&engine, &person, format);
        let back: Person = engine.from_bytes(&bytes, format).unwrap();
        assert_eq!(back, Person { session: String::new(), ..ada() }, "{format:?}");
    }
}

#[test]
fn excluded_members_are_not_written() {
    let engine = Engine::builder().register::<Person>().build();
    let person = ada();

    for format in FORMATS {
        let bytes = bytes_of(&engine, &person, format);
        let found = bytes.windows(b"session".len()).any(|w| w == b"session")
            || bytes.windows(b"token-123".len()).any(|w| w == b"token-123");
        assert!(!found, "{format:?}");
    }
}

#[test]
fn typed_and_untyped_entry_points() {
    let engine = Engine::builder().register::<Person>().build();
    let bytes = bytes_of(&engine, &ada(), Format::Json);

    let boxed = engine
        .deserialize_type(Person::model_info(), Format::Json, &bytes[..], None)
        .unwrap();
    assert_eq!(boxed.downcast_ref::<Person>().unwrap().name, ada().name);

    let Value::Shared(any) = engine.deserialize_any(Format::Json, &bytes[..], None).unwrap() else {
        panic!("expected a shared model");
    };
    assert_eq!(any.downcast::<Person>().unwrap().borrow().age, 36);

    let err = engine
        .deserialize_type(Address::model_info(), Format::Json, &bytes[..], None)
        .err()
        .unwrap();
    assert!(matches!(err, Error::TypeMismatch { .. }), "{err}");
}

#[test]
fn engines_share_a_member_cache() {
    let cache = Arc::new(MemberCache::new());
    let first = Engine::builder().register::<Person>().cache(cache.clone()).build();
    let second = Engine::builder().register::<Person>().cache(cache.clone()).build();

    let bytes = bytes_of(&first, &ada(), Format::Binary);
    assert!(cache.contains(core::any::TypeId::of::<Address>()));

    let back: Person = second.from_bytes(&bytes, Format::Binary).unwrap();
    assert_eq!(back.address, ada().address);
    assert!(Arc::ptr_eq(first.cache(), second.cache()));
}

// -----------------------------------------------------------------------------
// Cycles

#[test]
fn cycles_relink_in_graph_mode() {
    let engine = Engine::builder().register::<Node>().build();

    let root = node("root");
    let child = node("child");
    child.borrow_mut().next = Some(root.clone());
    root.borrow_mut().next = Some(child.clone());
    root.borrow_mut().children.push(child.clone());

    for format in FORMATS {
        let bytes = bytes_of(&engine, &*root.borrow(), format);
        let back = engine.deserialize_shared::<Node>(format, &bytes[..], None).unwrap();

        let next = back.borrow().next.clone().unwrap();
        assert_eq!(next.borrow().label, "child");
        assert!(next.ptr_eq(&back.borrow().children[0]), "{format:?}");
        assert!(next.borrow().next.as_ref().unwrap().ptr_eq(&back), "{format:?}");
    }
}

#[test]
fn cycles_fail_in_strict_mode() {
    let engine = Engine::builder().register::<Node>().build();
    let strict = SerializationConfig::default().with_preserve_graph(false);

    let root = node("root");
    let child = node("child");
    child.borrow_mut().next = Some(root.clone());
    root.borrow_mut().next = Some(child.clone());

    for format in FORMATS {
        let err = engine
            .serialize(&*root.borrow(), format, Vec::new(), Some(&strict))
            .err()
            .unwrap();
        assert!(matches!(err, Error::CircularReference { .. }), "{err}");
        assert_eq!(err.member(), Some("next.next"));
    }
}

#[test]
fn strict_mode_duplicates_shared_values() {
    let engine = Engine::builder().register::<Node>().build();
    let strict = SerializationConfig::default().with_preserve_graph(false);

    let leaf = node("leaf");
    let root = node("root");
    root.borrow_mut().children = vec![leaf.clone(), leaf.clone()];

    let mut bytes = Vec::new();
    engine.serialize(&*root.borrow(), Format::Json, &mut bytes, Some(&strict)).unwrap();
    let back = engine
        .deserialize_shared::<Node>(Format::Json, &bytes[..], Some(&strict))
        .unwrap();

    let children = back.borrow().children.clone();
    assert_eq!(children[1].borrow().label, "leaf");
    assert!(!children[0].ptr_eq(&children[1]));
}

#[test]
fn self_references_relink_in_graph_mode() {
    let engine = Engine::builder().register::<Node>().build();
    let lonely = node("lonely");
    lonely.borrow_mut().next = Some(lonely.clone());

    for format in FORMATS {
        let bytes = bytes_of(&engine, &*lonely.borrow(), format);
        let back = engine.deserialize_shared::<Node>(format, &bytes[..], None).unwrap();

        let next = back.borrow().next.clone().unwrap();
        assert!(next.ptr_eq(&back), "{format:?}");
        assert_eq!(next.borrow().label, "lonely");
        back.borrow_mut().next = None;
    }
    lonely.borrow_mut().next = None;
}

#[test]
fn self_references_fail_in_strict_mode() {
    let engine = Engine::builder().register::<Node>().build();
    let strict = SerializationConfig::default().with_preserve_graph(false);
    let lonely = node("lonely");
    lonely.borrow_mut().next = Some(lonely.clone());

    for format in FORMATS {
        let err = engine
            .serialize(&*lonely.borrow(), format, Vec::new(), Some(&strict))
            .err()
            .unwrap();
        assert!(matches!(err, Error::CircularReference { .. }), "{err}");
        assert_eq!(err.member(), Some("next"));
    }
    lonely.borrow_mut().next = None;
}

// -----------------------------------------------------------------------------
// Value trees

static LAYER_CLONES: AtomicUsize = AtomicUsize::new(0);

#[derive(Model, Default, PartialEq, Debug)]
struct Layer {
    level: u32,
    inner: Vec<Layer>,
}

impl Clone for Layer {
    fn clone(&self) -> Self {
        LAYER_CLONES.fetch_add(1, Ordering::Relaxed);
        Self {
            level: self.level,
            inner: self.inner.clone(),
        }
    }
}

fn layers(depth: u32) -> Layer {
    let mut layer = Layer::default();
    for level in 1..depth {
        layer = Layer {
            level,
            inner: vec![layer],
        };
    }
    layer
}

#[test]
fn value_trees_are_written_in_place() {
    let engine = Engine::builder().register::<Layer>().build();
    let tree = layers(32);

    for format in FORMATS {
        let before = LAYER_CLONES.load(Ordering::Relaxed);
        let bytes = bytes_of(&engine, &tree, format);
        assert_eq!(LAYER_CLONES.load(Ordering::Relaxed), before, "{format:?}");

        let back: Layer = engine.from_bytes(&bytes, format).unwrap();
        assert_eq!(back, tree, "{format:?}");
    }
}

// -----------------------------------------------------------------------------
// Redirects

mod legacy {
    use crate::derive::Model;

    #[derive(Model, Default, Clone, PartialEq, Debug)]
    #[persist(assembly = "Old", type_name = "Foo")]
    pub struct Foo {
        pub value: i32,
        pub label: String,
    }
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
#[persist(assembly = "New", type_name = "Bar")]
struct Bar {
    value: i32,
    label: String,
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
#[persist(assembly = "New", type_name = "Baz", redirect_from(assembly = "Old", type_name = "Foo"))]
struct Baz {
    value: i32,
    label: String,
}

fn old_foo() -> legacy::Foo {
    legacy::Foo {
        value: 7,
        label: "seven".into(),
    }
}

#[test]
fn redirected_types_read_as_their_successor() {
    let writer = Engine::builder().register::<legacy::Foo>().build();
    let reader = Engine::builder()
        .register::<Bar>()
        .redirect(TypeKey::new("Old", "Foo"), TypeKey::new("New", "Bar"))
        .build();

    for format in FORMATS {
        let bytes = bytes_of(&writer, &old_foo(), format);
        let bar: Bar = reader.from_bytes(&bytes, format).unwrap();
        assert_eq!(bar, Bar { value: 7, label: "seven".into() });
    }
}

#[test]
fn declared_redirects_are_collected() {
    let writer = Engine::builder().register::<legacy::Foo>().build();
    let reader = Engine::builder().register::<Baz>().build();
    assert_eq!(reader.redirector().len(), 1);

    let bytes = bytes_of(&writer, &old_foo(), Format::Xml);
    let baz: Baz = reader.from_bytes(&bytes, Format::Xml).unwrap();
    assert_eq!(baz, Baz { value: 7, label: "seven".into() });
}

#[test]
fn redirect_cycles_fail() {
    let writer = Engine::builder().register::<legacy::Foo>().build();
    let reader = Engine::builder()
        .register::<Bar>()
        .redirect(TypeKey::new("Old", "Foo"), TypeKey::new("Mid", "Foo"))
        .redirect(TypeKey::new("Mid", "Foo"), TypeKey::new("Old", "Foo"))
        .build();

    let bytes = bytes_of(&writer, &old_foo(), Format::Json);
    let err = reader.from_bytes::<Bar>(&bytes, Format::Json).err().unwrap();
    assert!(matches!(err, Error::RedirectCycle { .. }), "{err}");
}

// -----------------------------------------------------------------------------
// Enums

#[test]
fn enums_as_strings() {
    let engine = Engine::builder().register::<Person>().build();
    let person = ada();

    let json = text_of(&engine, &person, Format::Json);
    assert!(json.contains(r#""day": "Tuesday""#), "{json}");
    assert!(json.contains(r#""rest_day": 2"#), "{json}");

    let xml = text_of(&engine, &person, Format::Xml);
    assert!(xml.contains("<day>Tuesday</day>"), "{xml}");
    assert!(xml.contains("<rest_day>2</rest_day>"), "{xml}");
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
struct Schedule {
    #[persist(enum_as_string)]
    day: Weekday,
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
#[persist(type_name = "Schedule")]
struct ScheduleText {
    day: String,
}

#[test]
fn unknown_enum_names_fail() {
    let writer = Engine::builder().register::<ScheduleText>().build();
    let reader = Engine::builder().register::<Schedule>().build();

    for format in FORMATS {
        let known = bytes_of(&writer, &ScheduleText { day: "Wednesday".into() }, format);
        let schedule: Schedule = reader.from_bytes(&known, format).unwrap();
        assert_eq!(schedule.day, Weekday::Wednesday);

        let unknown = bytes_of(&writer, &ScheduleText { day: "Funday".into() }, format);
        let err = reader.from_bytes::<Schedule>(&unknown, format).err().unwrap();
        match err {
            Error::UnknownEnumValue { value, member, .. } => {
                assert_eq!(value, "Funday");
                assert_eq!(member.as_deref(), Some("day"));
            }
            other => panic!("{format:?}: unexpected error {other}"),
        }
    }
}

// -----------------------------------------------------------------------------
// Member policies

#[derive(Model, Default, Clone, PartialEq, Debug)]
#[persist(type_name = "Shape")]
struct Slim {
    a: i32,
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
#[persist(type_name = "Shape")]
struct Full {
    a: i32,
    extra: String,
}

#[test]
fn unknown_members_follow_the_policy() {
    let writer = Engine::builder().register::<Full>().build();
    let reader = Engine::builder().register::<Slim>().build();
    let strict = SerializationConfig::default().with_allow_unknown_members(false);

    for format in FORMATS {
        let bytes = bytes_of(&writer, &Full { a: 5, extra: "x".into() }, format);

        let slim: Slim = reader.from_bytes(&bytes, format).unwrap();
        assert_eq!(slim, Slim { a: 5 });

        let err = reader
            .deserialize::<Slim>(format, &bytes[..], Some(&strict))
            .err()
            .unwrap();
        assert!(matches!(&err, Error::UnknownMember { member, .. } if member == "extra"), "{err}");
    }
}

#[test]
fn absent_members_follow_the_policy() {
    let writer = Engine::builder().register::<Slim>().build();
    let reader = Engine::builder().register::<Full>().build();
    let strict = SerializationConfig::default().with_require_all_members(true);

    for format in FORMATS {
        let bytes = bytes_of(&writer, &Slim { a: 5 }, format);

        let full: Full = reader.from_bytes(&bytes, format).unwrap();
        assert_eq!(full, Full { a: 5, extra: String::new() });

        let err = reader
            .deserialize::<Full>(format, &bytes[..], Some(&strict))
            .err()
            .unwrap();
        assert!(matches!(&err, Error::MissingMember { member, .. } if member == "extra"), "{err}");
    }
}

// -----------------------------------------------------------------------------
// Depth

#[derive(Model, Default, Clone)]
struct Link {
    next: Option<Shared<Link>>,
}

fn chain(len: usize) -> Shared<Link> {
    let mut head = Shared::new(Link::default());
    for _ in 1..len {
        head = Shared::new(Link { next: Some(head) });
    }
    head
}

#[test]
fn depth_is_bounded_both_ways() {
    let engine = Engine::builder().register::<Link>().build();
    let shallow = SerializationConfig::default().with_max_depth(4);
    let head = chain(6);

    for format in FORMATS {
        let err = engine
            .serialize(&*head.borrow(), format, Vec::new(), Some(&shallow))
            .err()
            .unwrap();
        assert!(matches!(err, Error::DepthExceeded { max_depth: 4, .. }), "{err}");
        assert_eq!(err.member(), Some("next.next.next.next"));

        let bytes = bytes_of(&engine, &*head.borrow(), format);
        let err = engine
            .deserialize_shared::<Link>(format, &bytes[..], Some(&shallow))
            .err()
            .unwrap();
        assert!(matches!(err, Error::DepthExceeded { max_depth: 4, .. }), "{err}");

        assert!(engine.deserialize_shared::<Link>(format, &bytes[..], None).is_ok());
    }
}

/// A binary `Slim` whose unknown member `x` nests `depth` objects.
fn slim_with_deep_member(depth: usize) -> Vec<u8> {
    let config = SerializationConfig::default();
    let mut cx = SerializationContext::new(&config);
    let slim = ObjectHeader {
        key: Slim::model_info().key().clone(),
        id: None,
    };
    let unknown = ObjectHeader {
        key: TypeKey::new("elsewhere", "Unknown"),
        id: None,
    };

    let mut writer = BinaryWriter::new(Vec::new());
    writer.begin_object(&mut cx, None, &slim).unwrap();
    writer.write_literal(&mut cx, Some("a"), &Literal::Int(5)).unwrap();
    for _ in 0..depth {
        writer.begin_object(&mut cx, Some("x"), &unknown).unwrap();
    }
    for _ in 0..depth {
        writer.end_object(&mut cx).unwrap();
    }
    writer.end_object(&mut cx).unwrap();
    writer.into_inner()
}

#[test]
fn skipped_members_respect_the_depth_bound() {
    let engine = Engine::builder().register::<Slim>().build();

    let bytes = slim_with_deep_member(8);
    let slim: Slim = engine.from_bytes(&bytes, Format::Binary).unwrap();
    assert_eq!(slim, Slim { a: 5 });

    let bytes = slim_with_deep_member(200_000);
    let err = engine.from_bytes::<Slim>(&bytes, Format::Binary).err().unwrap();
    assert!(matches!(err, Error::DepthExceeded { .. }), "{err}");
}

#[test]
fn skipped_objects_respect_the_depth_bound() {
    let engine = Engine::builder().register::<Holder>().build();
    let lenient = SerializationConfig::default()
        .with_unresolved_types(UnresolvedTypePolicy::SkipAsNull)
        .with_max_depth(16);

    let config = SerializationConfig::default();
    let mut cx = SerializationContext::new(&config);
    let holder = ObjectHeader {
        key: Holder::model_info().key().clone(),
        id: None,
    };
    let unknown = ObjectHeader {
        key: TypeKey::new("elsewhere", "Unknown"),
        id: None,
    };
    let mut writer = BinaryWriter::new(Vec::new());
    writer.begin_object(&mut cx, None, &holder).unwrap();
    writer.begin_object(&mut cx, Some("item"), &unknown).unwrap();
    for _ in 0..64 {
        writer.begin_collection(&mut cx, Some("inner"), 0).unwrap();
        writer.begin_object(&mut cx, Some("inner"), &unknown).unwrap();
    }
    for _ in 0..66 {
        writer.end_object(&mut cx).unwrap();
    }
    let bytes = writer.into_inner();

    let err = engine
        .deserialize::<Holder>(Format::Binary, &bytes[..], Some(&lenient))
        .err()
        .unwrap();
    assert!(matches!(err, Error::DepthExceeded { max_depth: 16, .. }), "{err}");
}

#[test]
fn deep_xml_fails_without_exhausting_the_stack() {
    let engine = Engine::builder().register::<Link>().build();
    let key = Link::model_info().key();
    let attributes = format!(r#"type="{}" assembly="{}""#, key.name(), key.assembly());

    let depth = 300_000;
    let mut text = format!("<object {attributes}>");
    text.push_str(&format!("<next {attributes}>").repeat(depth));
    text.push_str(&"</next>".repeat(depth));
    text.push_str("</object>");

    let err = engine
        .deserialize_shared::<Link>(Format::Xml, text.as_bytes(), None)
        .err()
        .unwrap();
    assert!(matches!(err, Error::DepthExceeded { .. }), "{err}");
}

// -----------------------------------------------------------------------------
// Unresolved types

#[derive(Model, Default, Clone)]
struct Gadget {
    power: u32,
}

#[derive(Model, Default, Clone)]
struct Holder {
    label: String,
    item: Option<SharedModel>,
}

#[test]
fn unresolved_types_fail_or_read_as_null() {
    let writer = Engine::builder().register::<Holder>().register::<Gadget>().build();
    let reader = Engine::builder().register::<Holder>().build();
    let lenient = SerializationConfig::default().with_unresolved_types(UnresolvedTypePolicy::SkipAsNull);

    let holder = Holder {
        label: "box".into(),
        item: Some(Shared::new(Gadget { power: 9 }).into()),
    };

    for format in FORMATS {
        let bytes = bytes_of(&writer, &holder, format);

        let err = reader.from_bytes::<Holder>(&bytes, format).err().unwrap();
        assert!(matches!(&err, Error::TypeResolution { key, .. } if key.name() == "Gadget"), "{err}");
        assert_eq!(err.member(), Some("item"));

        let back: Holder = reader.deserialize(format, &bytes[..], Some(&lenient)).unwrap();
        assert_eq!(back.label, "box");
        assert!(back.item.is_none());

        let full: Holder = writer.from_bytes(&bytes, format).unwrap();
        let gadget = full.item.unwrap().downcast::<Gadget>().unwrap();
        assert_eq!(gadget.borrow().power, 9);
    }
}

// -----------------------------------------------------------------------------
// Hooks and converters

#[derive(Model, Default, Clone, PartialEq, Debug)]
struct Account {
    login: String,
    secret: String,
    password: String,
}

struct Redact;

impl MemberHook for Redact {
    fn before_serialize(&self, member: &mut MemberValue<'_>) -> Result<()> {
        match member.name() {
            "secret" => member.replace("***".to_string().to_value()),
            "password" => member.skip(),
            _ => {}
        }
        Ok(())
    }
}

struct Shout;

impl MemberHook for Shout {
    fn after_deserialize(&self, member: &mut MemberValue<'_>) -> Result<()> {
        if member.name() == "login"
            && let Value::Literal(Literal::Str(login)) = member.value()
        {
            let loud = login.to_uppercase();
            member.replace(loud.to_value());
        }
        Ok(())
    }
}

struct Count(Arc<AtomicUsize>);

impl MemberHook for Count {
    fn after_serialize(&self, _: &MemberValue<'_>) -> Result<()> {
        self.0.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn hooks_replace_and_skip() {
    let written = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder()
        .register::<Account>()
        .hook(Redact)
        .hook(Shout)
        .hook(Count(written.clone()))
        .build();

    let account = Account {
        login: "ada".into(),
        secret: "hunter2".into(),
        password: "swordfish".into(),
    };

    for format in FORMATS {
        let bytes = bytes_of(&engine, &account, format);
        let back: Account = engine.from_bytes(&bytes, format).unwrap();
        assert_eq!(
            back,
            Account {
                login: "ADA".into(),
                secret: "***".into(),
                password: String::new(),
            }
        );
    }
    assert_eq!(written.load(Ordering::Relaxed), 2 * FORMATS.len());
}

#[derive(Model, Default, Clone)]
struct Pair {
    a: Option<SharedModel>,
    b: Option<SharedModel>,
}

/// Gives each member a freshly allocated gadget while writing.
struct Fresh;

impl MemberHook for Fresh {
    fn before_serialize(&self, member: &mut MemberValue<'_>) -> Result<()> {
        let power = match member.name() {
            "a" => 1,
            "b" => 2,
            _ => return Ok(()),
        };
        member.replace(Value::Shared(SharedModel::new(Gadget { power })));
        Ok(())
    }
}

#[test]
fn instances_created_while_writing_keep_their_identity() {
    let engine = Engine::builder()
        .register::<Pair>()
        .register::<Gadget>()
        .hook(Fresh)
        .build();

    for format in FORMATS {
        let bytes = bytes_of(&engine, &Pair::default(), format);
        let back: Pair = engine.from_bytes(&bytes, format).unwrap();

        let a = back.a.unwrap().downcast::<Gadget>().unwrap();
        let b = back.b.unwrap().downcast::<Gadget>().unwrap();
        assert_eq!(a.borrow().power, 1, "{format:?}");
        assert_eq!(b.borrow().power, 2, "{format:?}");
        assert!(!a.ptr_eq(&b), "{format:?}");
    }
}

struct Seconds;

impl MemberConverter for Seconds {
    fn to_persisted(&self, value: Value) -> Result<Value> {
        let ms = u64::from_value(value)?;
        Ok(Literal::Float(ms as f64 / 1000.0).into())
    }

    fn from_persisted(&self, value: Value) -> Result<Value> {
        let seconds = f64::from_value(value)?;
        Ok(Literal::UInt((seconds * 1000.0).round() as u64).into())
    }

    fn persisted_kind(&self, _: &ValueKind) -> ValueKind {
        ValueKind::Float
    }
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
struct Timeout {
    #[persist(converter = "seconds")]
    duration_ms: u64,
}

#[test]
fn converters_map_persisted_form() {
    let engine = Engine::builder()
        .register::<Timeout>()
        .converter("seconds", Seconds)
        .build();
    let timeout = Timeout { duration_ms: 1500 };

    assert!(text_of(&engine, &timeout, Format::Json).contains(r#""duration_ms": 1.5"#));
    for format in FORMATS {
        let bytes = bytes_of(&engine, &timeout, format);
        assert_eq!(engine.from_bytes::<Timeout>(&bytes, format).unwrap(), timeout);
    }

    let bare = Engine::builder().register::<Timeout>().build();
    let err = bare.to_bytes(&timeout, Format::Json).err().unwrap();
    assert!(matches!(err, Error::UnsupportedType { .. }), "{err}");
}

// -----------------------------------------------------------------------------
// Custom serialization

#[derive(Model, Default, Clone, PartialEq, Debug)]
#[persist(custom)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl CustomSerialize for Rgb {
    fn serialize_custom(&self, writer: &mut CustomWriter<'_, '_>) -> Result<()> {
        writer.write("hex", &format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b))
    }

    fn deserialize_custom(&mut self, reader: &mut CustomReader<'_, '_>) -> Result<()> {
        let hex: String = reader.read("hex")?;
        let channel = |at: usize| {
            hex.get(at..at + 2)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| Error::custom(format!("bad color `{hex}`")))
        };
        self.r = channel(1)?;
        self.g = channel(3)?;
        self.b = channel(5)?;
        Ok(())
    }
}

#[derive(Model, Default, Clone, PartialEq, Debug)]
struct Canvas {
    title: String,
    #[persist(custom)]
    color: Rgb,
    palette: Vec<Rgb>,
}

#[test]
fn custom_models_write_their_own_members() {
    let engine = Engine::builder().register::<Canvas>().build();
    let canvas = Canvas {
        title: "sunset".into(),
        color: Rgb { r: 255, g: 128, b: 0 },
        palette: vec![Rgb { r: 1, g: 2, b: 3 }],
    };

    let json = text_of(&engine, &canvas, Format::Json);
    assert!(json.contains(r##""hex": "#ff8000""##), "{json}");
    assert!(!json.contains(r#""r":"#), "{json}");

    for format in FORMATS {
        let bytes = bytes_of(&engine, &canvas, format);
        assert_eq!(engine.from_bytes::<Canvas>(&bytes, format).unwrap(), canvas, "{format:?}");
    }
}

// -----------------------------------------------------------------------------
// Culture

#[test]
fn xml_floats_follow_the_culture() {
    let config = SerializationConfig::default().with_culture(Culture::new("de-DE", ','));
    let engine = Engine::builder().register::<Person>().config(config).build();

    let xml = text_of(&engine, &ada(), Format::Xml);
    assert!(xml.contains("<height>1,85</height>"), "{xml}");

    let back: Person = engine.from_bytes(xml.as_bytes(), Format::Xml).unwrap();
    assert_eq!(back.height, 1.85);

    let invariant = SerializationConfig::default();
    let err = engine
        .deserialize::<Person>(Format::Xml, xml.as_bytes(), Some(&invariant))
        .err()
        .unwrap();
    assert_eq!(err.member(), Some("height"));
}
