//! Integration tests for pipelines, command options and search facets.

use std::time::Duration;

use pretty_assertions::assert_eq;
use prax_mongo_dsl::prelude::*;

#[allow(dead_code)]
struct Sale {
    store: String,
    item: String,
    quantity: i32,
    price: f64,
}

document_fields! {
    Sale {
        store: String,
        item: String,
        quantity: i32,
        price: f64,
    }
}

#[test]
fn test_union_with_and_group() {
    let pipeline = aggregation(|p| {
        p.set(|s| s.value("_id", "2017"))
            .union_with(|u| {
                u.coll("sales_2018")
                    .pipeline(|p| p.set(|s| s.value("_id", "2018")))
            })
            .union_with(|u| {
                u.coll("sales_2019")
                    .pipeline(|p| p.set(|s| s.value("_id", "2019")))
            })
            .group(Sale::item(), |g| g.sum("total", Sale::quantity()))
            .sort(|s| s.desc("total"))
    })
    .unwrap();

    assert_eq!(
        pipeline.to_bson(),
        Bson::Array(vec![
            Bson::Document(doc! { "$set": { "_id": "2017" } }),
            Bson::Document(doc! {
                "$unionWith": {
                    "coll": "sales_2018",
                    "pipeline": [{ "$set": { "_id": "2018" } }],
                }
            }),
            Bson::Document(doc! {
                "$unionWith": {
                    "coll": "sales_2019",
                    "pipeline": [{ "$set": { "_id": "2019" } }],
                }
            }),
            Bson::Document(doc! {
                "$group": { "_id": "$item", "total": { "$sum": "$quantity" } }
            }),
            Bson::Document(doc! { "$sort": { "total": -1 } }),
        ])
    );
}

#[test]
fn test_group_with_expressions() {
    let pipeline = aggregation(|p| {
        p.group(Sale::store(), |g| {
            g.count("sales")
                .accumulator("units", expression(|e| e.sum()))
                .sum(
                    "revenue",
                    expression(|e| e.multiply(|m| m.of(Sale::price()).of(Sale::quantity()))),
                )
                .avg("average_price", Sale::price())
        })
    })
    .unwrap();

    assert_eq!(
        pipeline.stages()[0],
        doc! {
            "$group": {
                "_id": "$store",
                "sales": { "$count": {} },
                "units": { "$sum": 1 },
                "revenue": { "$sum": { "$multiply": ["$price", "$quantity"] } },
                "average_price": { "$avg": "$price" },
            }
        }
    );
}

#[test]
fn test_set_stage_with_expressions() {
    let pipeline = aggregation(|p| {
        p.match_stage(doc! { "store": "north" })
            .set(|s| {
                s.expression("rounded", expression(|e| e.round_up_price()))
                    .value("currency", "$USD")
            })
    })
    .unwrap();

    assert_eq!(
        pipeline.stages()[1],
        doc! {
            "$set": {
                "rounded": { "$ceil": "$price" },
                "currency": { "$literal": "$USD" },
            }
        }
    );
}

trait PriceExpressions {
    fn round_up_price(&self) -> AggregationResult<Expression>;
}

impl PriceExpressions for ExpressionBuilder {
    fn round_up_price(&self) -> AggregationResult<Expression> {
        self.ceil(Sale::price())
    }
}

#[test]
fn test_pipeline_reports_first_error() {
    let err = aggregation(|p| {
        p.limit(0)
            .sort(|s| s.asc("$$ROOT"))
            .group("store", |g| g.sum("_id", 1))
    })
    .unwrap_err();
    assert!(matches!(err, AggregationError::InvalidStage(_)));

    let err = aggregation(|p| p.union_with(|u| u)).unwrap_err();
    assert!(matches!(err, AggregationError::InvalidStage(_)));

    let err = aggregation(|p| p.set(|s| s.expression("total", expression(|e| e.add(|a| a)))))
        .unwrap_err();
    assert!(err.is_arity());
}

#[test]
fn test_aggregate_command() {
    let pipeline = aggregation(|p| {
        p.sort(|s| s.by(Sale::price(), SortDirection::Descending))
            .skip(10)
            .limit(5)
    })
    .unwrap();

    let options = AggregationOptions::builder()
        .allow_disk_use(true)
        .batch_size(50)
        .max_time(Duration::from_millis(1500))
        .hint(Hint::Keys(doc! { "price": -1 }))
        .build()
        .unwrap();

    let command = pipeline.to_command("sales", &options).unwrap();
    assert_eq!(
        command,
        doc! {
            "aggregate": "sales",
            "pipeline": [
                { "$sort": { "price": -1 } },
                { "$skip": 10_i64 },
                { "$limit": 5_i64 },
            ],
            "allowDiskUse": true,
            "cursor": { "batchSize": 50 },
            "maxTimeMS": 1500_i64,
            "hint": { "price": -1 },
        }
    );

    assert!(pipeline.to_command("", &options).is_err());
}

#[test]
fn test_search_facets() {
    let numeric = numeric_facet(|f| f.path(Sale::price()).boundaries([0, 10, 100])).unwrap();
    assert_eq!(
        numeric,
        doc! { "type": "number", "path": "price", "boundaries": [0, 10, 100] }
    );

    let string = string_facet(|f| f.path(Sale::store()).num_buckets(20)).unwrap();
    assert_eq!(
        string,
        doc! { "type": "string", "path": "store", "numBuckets": 20_i64 }
    );

    assert!(numeric_facet(|f| f.boundaries([10, 0])).is_err());
}
