//! Key generation behaviour across argument shapes

use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use easy_cache::cache::{CallSignature, KeyGenerator, KeyGeneratorConfig};
use easy_cache::value::{
    CacheFields, CacheValue, CustomArgument, PersistedEntity, QueryParams, RecordField,
    SharedValue, ToCacheValue,
};
use easy_cache::{cache_list, cache_map, function_identity, ArgumentRef, Error};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::str::FromStr;

fn key_of(call: CallSignature) -> String {
    KeyGenerator::default()
        .generate_key(&call)
        .unwrap()
        .key
        .into_string()
}

fn call() -> CallSignature {
    CallSignature::for_function("reports.views", "monthly")
}

#[test]
fn test_mapping_order_does_not_matter() {
    let a = cache_map! { "name" => "John", "age" => 30, "city" => "NYC" };
    let b = cache_map! { "city" => "NYC", "name" => "John", "age" => 30 };
    assert_eq!(key_of(call().arg(&a)), key_of(call().arg(&b)));

    let nested_a = cache_map! { "outer" => cache_map! { "x" => 1, "y" => 2 }, "z" => 3 };
    let nested_b = cache_map! { "z" => 3, "outer" => cache_map! { "y" => 2, "x" => 1 } };
    assert_eq!(
        key_of(call().kwarg("filters", nested_a)),
        key_of(call().kwarg("filters", nested_b))
    );
}

#[test]
fn test_hash_map_iteration_order_does_not_matter() {
    let mut a = HashMap::new();
    let mut b = HashMap::new();
    for i in 0..50 {
        a.insert(format!("k{i}"), i);
    }
    for i in (0..50).rev() {
        b.insert(format!("k{i}"), i);
    }
    assert_eq!(key_of(call().arg(&a)), key_of(call().arg(&b)));
}

#[test]
fn test_set_order_does_not_matter() {
    let a: HashSet<i32> = [3, 1, 2].into_iter().collect();
    let b: BTreeSet<i32> = [1, 2, 3].into_iter().collect();
    assert_eq!(key_of(call().arg(&a)), key_of(call().arg(&b)));

    let mixed_a = CacheValue::FrozenSet(vec![
        "b".to_cache_value(),
        1.to_cache_value(),
        "a".to_cache_value(),
    ]);
    let mixed_b = CacheValue::FrozenSet(vec![
        1.to_cache_value(),
        "a".to_cache_value(),
        "b".to_cache_value(),
    ]);
    assert_eq!(key_of(call().arg(mixed_a)), key_of(call().arg(mixed_b)));
}

#[test]
fn test_sequence_order_matters() {
    assert_ne!(
        key_of(call().arg(vec![1, 2, 3])),
        key_of(call().arg(vec![3, 2, 1]))
    );
    assert_ne!(key_of(call().arg((1, 2))), key_of(call().arg((2, 1))));
    assert_ne!(key_of(call().arg(1).arg(2)), key_of(call().arg(2).arg(1)));
}

#[test]
fn test_different_arguments_give_different_keys() {
    assert_ne!(key_of(call().arg(1)), key_of(call().arg(2)));
    assert_ne!(key_of(call().arg(1)), key_of(call().arg("1")));
    assert_ne!(
        key_of(call().kwarg("a", 1)),
        key_of(call().kwarg("b", 1))
    );
    assert_ne!(
        key_of(call().arg(1)),
        key_of(CallSignature::for_function("reports.views", "weekly").arg(1))
    );
}

#[test]
fn test_unstable_types_are_excluded_at_any_depth() {
    let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let build = |ts: chrono::DateTime<Utc>, id: uuid::Uuid| {
        call()
            .arg(ts)
            .kwarg(
                "payload",
                cache_map! {
                    "id" => 1,
                    "created" => ts,
                    "day" => ts.date_naive(),
                    "events" => cache_list![ts, "login", cache_map! { "at" => ts, "kind" => "x" }],
                    "request_id" => id,
                },
            )
    };

    assert_eq!(
        key_of(build(earlier, uuid::Uuid::new_v4())),
        key_of(build(later, uuid::Uuid::new_v4()))
    );

    let generated = KeyGenerator::default()
        .generate_key(&build(earlier, uuid::Uuid::new_v4()))
        .unwrap();
    assert_eq!(
        generated.original_params,
        r#"payload={"events":["login",{"kind":"x"}],"id":1}"#
    );
}

#[test]
fn test_exclusion_can_be_disabled_and_extended() {
    let generator = KeyGenerator::new(KeyGeneratorConfig::default().without_auto_exclude()).unwrap();
    let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let generated = generator.generate_key(&call().arg(day)).unwrap();
    assert_eq!(generated.original_params, r#""2025-03-01""#);

    let generator = KeyGenerator::new(KeyGeneratorConfig::default().exclude("Session")).unwrap();
    let generated = generator
        .generate_key(
            &call()
                .arg(CacheValue::entity("Session", "abc"))
                .arg(cache_map! { "session" => CacheValue::entity("Session", "abc"), "n" => 1 }),
        )
        .unwrap();
    assert_eq!(generated.original_params, r#"{"n":1}"#);
}

struct Report {
    title: String,
    year: i32,
    rendered_at: String,
}

impl CacheFields for Report {
    fn type_name(&self) -> &str {
        "Report"
    }

    fn cache_fields(&self) -> Vec<RecordField> {
        vec![
            RecordField::stable("title", &self.title),
            RecordField::stable("year", self.year),
            RecordField::unstable("rendered_at", &self.rendered_at),
        ]
    }
}

fn report(title: &str, year: i32, rendered_at: &str) -> CacheValue {
    CacheValue::from_fields(&Report {
        title: title.to_string(),
        year,
        rendered_at: rendered_at.to_string(),
    })
}

#[test]
fn test_stable_record_fields_drive_the_key() {
    assert_ne!(
        key_of(call().arg(report("Sales", 2024, "t1"))),
        key_of(call().arg(report("Sales", 2025, "t1")))
    );
    assert_eq!(
        key_of(call().arg(report("Sales", 2024, "t1"))),
        key_of(call().arg(report("Sales", 2024, "t2")))
    );
}

#[test]
fn test_private_object_attributes_are_ignored() {
    let widget = |secret: &str| {
        CacheValue::object(
            "Widget",
            [
                ("name", "gauge".to_cache_value()),
                ("_cache", secret.to_cache_value()),
            ],
        )
    };
    assert_eq!(key_of(call().arg(widget("a"))), key_of(call().arg(widget("b"))));
}

struct User {
    pk: u64,
    last_login: String,
}

impl PersistedEntity for User {
    fn entity_type(&self) -> &str {
        "User"
    }

    fn entity_id(&self) -> String {
        self.pk.to_string()
    }
}

#[test]
fn test_persisted_entities_are_keyed_by_identity() {
    let first = User {
        pk: 7,
        last_login: "yesterday".into(),
    };
    let second = User {
        pk: 7,
        last_login: "today".into(),
    };
    assert_ne!(first.last_login, second.last_login);

    let generated = KeyGenerator::default()
        .generate_key(&call().arg(CacheValue::from_entity(&first)))
        .unwrap();
    assert_eq!(generated.original_params, "User:7");
    assert_eq!(
        key_of(call().arg(CacheValue::from_entity(&first))),
        key_of(call().arg(CacheValue::from_entity(&second)))
    );
    assert_ne!(
        key_of(call().arg(CacheValue::entity("User", 7))),
        key_of(call().arg(CacheValue::entity("User", 8)))
    );
}

#[test]
fn test_none_value_differs_from_absent_key() {
    let with_null = cache_map! { "a" => 1, "b" => CacheValue::Null };
    let without = cache_map! { "a" => 1 };
    assert_ne!(key_of(call().arg(with_null)), key_of(call().arg(without)));
}

#[test]
fn test_truncation_is_idempotent_and_sensitive() {
    let long_a: Vec<i32> = (0..100).collect();
    let mut long_b = long_a.clone();
    long_b[99] = -1;

    let first = KeyGenerator::default().generate_key(&call().arg(&long_a)).unwrap();
    let again = KeyGenerator::default().generate_key(&call().arg(&long_a)).unwrap();
    let other = KeyGenerator::default().generate_key(&call().arg(&long_b)).unwrap();

    assert_eq!(first.original_params.len(), 16);
    assert_eq!(first, again);
    assert_ne!(first.key, other.key);
    assert!(first.display_params.len() > 100);
}

#[test]
fn test_circular_references_are_rejected() {
    let node = SharedValue::new(cache_map! { "name" => "root" });
    let children = SharedValue::new(cache_list![]);
    node.update(|v| v.insert("children", &children));
    children.update(|v| {
        if let CacheValue::List(items) = v {
            items.push(node.to_cache_value());
        }
    });

    let err = KeyGenerator::default()
        .generate_key(&call().kwarg("tree", &node))
        .unwrap_err();
    assert!(err.is_uncachable());
    match err {
        Error::UncachableArgument {
            argument, function, ..
        } => {
            assert_eq!(argument, ArgumentRef::Keyword("tree".into()));
            assert_eq!(function, "reports.views.monthly");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_method_receiver_is_stripped() {
    let as_method = |receiver: &str| {
        CallSignature::for_method("billing", "Invoices.total")
            .arg(receiver)
            .arg(2025)
    };
    assert_eq!(key_of(as_method("instance one")), key_of(as_method("instance two")));

    let generated = KeyGenerator::default()
        .generate_key(&as_method("instance one"))
        .unwrap();
    assert_eq!(generated.original_params, "2025");
    assert_eq!(generated.function_name, "billing.Invoices.total");
}

#[test]
fn test_keys_respect_backend_constraints() {
    let generator = KeyGenerator::default();
    let calls = [
        call().arg("line\nbreak\r\0 and spaces"),
        call().arg("x".repeat(10_000)),
        call().kwarg("blob", cache_map! { "text" => "y".repeat(5_000) }),
        call().arg(QueryParams::parse("q=new%0Aline")),
    ];
    for call in calls {
        let generated = generator.generate_key(&call).unwrap();
        let key = generated.key.as_str();
        assert!(key.len() <= 250, "key too long: {key}");
        assert!(!key.contains(['\n', '\r', '\0']), "bad key: {key:?}");
        assert!(!generated.original_params.contains(['\n', '\r', '\0']));
    }
}

#[test]
fn test_decimals_compare_by_value() {
    let a = BigDecimal::from_str("19.99").unwrap();
    let b = BigDecimal::from_str("19.990").unwrap();
    let c = BigDecimal::from_str("19.98").unwrap();
    assert_eq!(key_of(call().arg(&a)), key_of(call().arg(&b)));
    assert_ne!(key_of(call().arg(&a)), key_of(call().arg(&c)));
}

#[test]
fn test_ip_addresses_and_durations_are_kept() {
    let generated = KeyGenerator::default()
        .generate_key(
            &call()
                .arg(Ipv4Addr::new(10, 0, 0, 1))
                .kwarg("window", Duration::minutes(5)),
        )
        .unwrap();
    assert_eq!(generated.original_params, r#""10.0.0.1"&window="PT300S""#);
}

#[test]
fn test_expiration_distinguishes_calls() {
    let at = |hour| Utc.with_ymd_and_hms(2025, 9, 5, hour, 30, 0).unwrap();
    let plain = key_of(call().arg(1));
    let first = key_of(call().arg(1).with_expiration(at(14)));
    let second = key_of(call().arg(1).with_expiration(at(15)));

    assert!(first.starts_with(&plain));
    assert!(first.ends_with("_20250905_143000"));
    assert_ne!(first, second);
}

#[test]
fn test_reserved_keywords_are_skipped() {
    let generator =
        KeyGenerator::new(KeyGeneratorConfig::default().with_reserved_keywords(["context"])).unwrap();
    let generated = generator
        .generate_key(&call().kwarg("context", "ignored").kwarg("request", "kept"))
        .unwrap();
    assert_eq!(generated.original_params, r#"request="kept""#);

    assert_eq!(
        key_of(call().kwarg("args", 1).kwarg("kwargs", 2)),
        key_of(call())
    );
}

#[derive(Debug)]
struct Point(i32, i32);

impl CustomArgument for Point {
    fn type_name(&self) -> &str {
        "Point"
    }

    fn stable_repr(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Ok(format!("Point({}, {})", self.0, self.1))
    }
}

#[derive(Debug)]
struct Broken;

impl CustomArgument for Broken {
    fn type_name(&self) -> &str {
        "Broken"
    }

    fn stable_repr(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Err("no stable form".into())
    }
}

#[test]
fn test_custom_arguments_use_their_stable_form() {
    let generated = KeyGenerator::default()
        .generate_key(&call().arg(CacheValue::custom(Point(1, 2))))
        .unwrap();
    assert_eq!(generated.original_params, r#""Point(1,_2)""#);

    let err = KeyGenerator::default()
        .generate_key(&call().arg(1).kwarg("shape", CacheValue::custom(Broken)))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Uncachable keyword argument 'shape' of type 'Broken' for function \
         'reports.views.monthly': string form of 'Broken' failed: no stable form"
    );
}

#[test]
fn test_request_parameters_fold_into_params() {
    let url = url::Url::parse("https://example.com/report?page=2&sort=name").unwrap();
    let generated = KeyGenerator::default()
        .generate_key(&call().arg(QueryParams::from_url(&url)).arg(5))
        .unwrap();
    assert_eq!(generated.original_params, r#"page="2"&sort="name"&5"#);

    let reordered = QueryParams::parse("sort=name&page=2");
    assert_ne!(
        key_of(call().arg(QueryParams::from_url(&url))),
        key_of(call().arg(reordered))
    );
}

#[test]
fn test_function_identity_macro() {
    let generated = KeyGenerator::default()
        .generate_key(&CallSignature::new(function_identity!(test_function_identity_macro)))
        .unwrap();
    assert_eq!(generated.function_name, "key_generation.test_function_identity_macro");
}

#[test]
fn test_deep_shared_chains_are_uncachable() {
    let mut chain = 0.to_cache_value();
    for _ in 0..2_000 {
        chain = SharedValue::new(chain).to_cache_value();
    }

    let generator = KeyGenerator::new(KeyGeneratorConfig::default().with_max_depth(64)).unwrap();
    for value in [cache_list![chain.clone()], chain] {
        let err = generator.generate_key(&call().arg(value)).unwrap_err();
        assert!(err.is_uncachable());
        assert!(
            err.to_string().ends_with("nesting exceeds the maximum depth of 64"),
            "{err}"
        );
    }
}

#[test]
fn test_non_finite_floats_do_not_collide_with_strings() {
    for (float, text) in [
        (f64::NAN, "NaN"),
        (f64::INFINITY, "Infinity"),
        (f64::NEG_INFINITY, "-Infinity"),
    ] {
        let as_float = KeyGenerator::default()
            .generate_key(&call().arg(float))
            .unwrap();
        let as_text = KeyGenerator::default()
            .generate_key(&call().arg(text))
            .unwrap();
        assert_eq!(as_float.original_params, text);
        assert_eq!(as_text.original_params, format!("\"{text}\""));
        assert_ne!(as_float.key, as_text.key);
    }
}

#[derive(Debug)]
struct Handle;

impl CustomArgument for Handle {
    fn type_name(&self) -> &str {
        "Handle"
    }

    fn stable_repr(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Ok("<Handle object at 0x7f3a9c2b10>".to_string())
    }
}

#[test]
fn test_address_like_string_forms_are_still_used() {
    let generated = KeyGenerator::default()
        .generate_key(&call().kwarg("conn", CacheValue::custom(Handle)))
        .unwrap();
    assert_eq!(
        generated.original_params,
        r#"conn="<Handle_object_at_0x7f3a9c2b10>""#
    );
    assert_eq!(
        generated.display_params,
        r#"conn="<Handle object at 0x7f3a9c2b10>""#
    );
}

#[test]
fn test_duplicate_set_elements_do_not_change_the_key() {
    assert_eq!(
        key_of(call().arg(CacheValue::set([1, 2, 2]))),
        key_of(call().arg(CacheValue::set([2, 1])))
    );
    assert_eq!(
        key_of(call().arg(CacheValue::Set(vec![CacheValue::Int(1), CacheValue::UInt(1)]))),
        key_of(call().arg(CacheValue::set([1])))
    );
    assert_ne!(
        key_of(call().arg(CacheValue::set([1, 2]))),
        key_of(call().arg(CacheValue::set([1])))
    );
}

#[test]
fn test_nested_shared_arguments_resolve_fully() {
    let owner = SharedValue::new(SharedValue::new(CacheValue::entity("User", 7)));
    let generated = KeyGenerator::default()
        .generate_key(&call().kwarg("owner", &owner))
        .unwrap();
    assert_eq!(generated.original_params, "owner=User:7");
    assert_eq!(
        key_of(call().kwarg("owner", &owner)),
        key_of(call().kwarg("owner", CacheValue::entity("User", 7)))
    );
}
