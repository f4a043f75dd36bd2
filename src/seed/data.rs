use crate::model::{FieldDef, ModelDef, ModelRef};
use crate::store::traits::ModelStore;
use anyhow::Result;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const TEST_APP: &str = "slumber_test";
pub const ORDERS_APP: &str = "shop.orders";
/// Application registered without any models
pub const EMPTY_APP: &str = "slumber_test.no_models";

/// Model definitions of the demo pizza shop
pub fn pizza_shop_models() -> Vec<ModelDef> {
    let shop = ModelRef::new(TEST_APP, "Shop");
    let pizza = ModelRef::new(TEST_APP, "Pizza");
    let price = ModelRef::new(TEST_APP, "PizzaPrice");

    vec![
        ModelDef::new(TEST_APP, "Shop")
            .with_field("name", FieldDef::char().unique())
            .with_field("web_address", FieldDef::char())
            .with_display_field("name"),
        ModelDef::new(TEST_APP, "Pizza")
            .with_field("name", FieldDef::char().unique())
            .with_field("for_sale", FieldDef::boolean())
            .with_field("max_extra_toppings", FieldDef::integer())
            .with_field("exclusive_to", FieldDef::foreign_key(shop, None))
            .with_display_field("name"),
        ModelDef::new(TEST_APP, "PizzaPrice")
            .with_field("pizza", FieldDef::foreign_key(pizza.clone(), Some("prices")))
            .with_field("date", FieldDef::date()),
        ModelDef::new(TEST_APP, "PizzaSizePrice")
            .with_field("price", FieldDef::foreign_key(price, Some("amounts")))
            .with_field("size", FieldDef::char())
            .with_field("amount", FieldDef::scalar("django.db.models.fields.DecimalField")),
        ModelDef::new(ORDERS_APP, "Order")
            .with_field("pizza", FieldDef::foreign_key(pizza, Some("orders")))
            .with_field("quantity", FieldDef::integer()),
    ]
}

/// Register the pizza shop models and the empty application
pub async fn load_models<S: ModelStore + ?Sized>(store: &S) -> Result<()> {
    for model in pizza_shop_models() {
        store.upsert_model(model).await?;
    }
    store.register_application(EMPTY_APP).await
}

/// Register the pizza shop models and fill them with a few rows
pub async fn load_seed_data<S: ModelStore + ?Sized>(store: &S) -> Result<()> {
    load_models(store).await?;

    let shop = ModelRef::new(TEST_APP, "Shop");
    let pizza = ModelRef::new(TEST_APP, "Pizza");
    let price = ModelRef::new(TEST_APP, "PizzaPrice");
    let size_price = ModelRef::new(TEST_APP, "PizzaSizePrice");
    let order = ModelRef::new(ORDERS_APP, "Order");

    let home = store
        .insert_row(
            &shop,
            values(&[("name", json!("Home")), ("web_address", json!("http://localhost/"))]),
        )
        .await?;

    let margherita = store
        .insert_row(
            &pizza,
            values(&[
                ("name", json!("Margherita")),
                ("for_sale", json!(true)),
                ("max_extra_toppings", json!(3)),
            ]),
        )
        .await?;
    store
        .insert_row(
            &pizza,
            values(&[
                ("name", json!("House Special")),
                ("for_sale", json!(true)),
                ("max_extra_toppings", json!(0)),
                ("exclusive_to", json!(home.pk)),
            ]),
        )
        .await?;

    for month in 1..=3 {
        let listed = store
            .insert_row(
                &price,
                values(&[
                    ("pizza", json!(margherita.pk)),
                    ("date", json!(format!("2011-0{}-01", month))),
                ]),
            )
            .await?;
        for (size, amount) in [("s", "7.50"), ("m", "9.50"), ("l", "12.00")] {
            store
                .insert_row(
                    &size_price,
                    values(&[
                        ("price", json!(listed.pk)),
                        ("size", json!(size)),
                        ("amount", json!(amount)),
                    ]),
                )
                .await?;
        }
    }

    store
        .insert_row(
            &order,
            values(&[("pizza", json!(margherita.pk)), ("quantity", json!(2))]),
        )
        .await?;

    log::info!("pizza shop seed data loaded");
    Ok(())
}

fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
