//! Product catalog cache and admin product mutations

use reqwest::multipart::Form;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use super::{Collection, NEW_ITEM};
use crate::error::{StoreError, StoreResult};
use crate::models::{Plan, PriceTable, Product};
use crate::transport::{Ack, ApiClient, Body, Upload};
use crate::wire::{product_from_wire, WireProduct};

/// Admin product form
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub prices: PriceTable,
    pub software_download_link: String,
    pub tutorial_video_link: String,
    pub apply_process: String,
    pub image: Option<Upload>,
}

#[derive(Serialize)]
struct ProductBody<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    price_1_day: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    price_7_days: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    price_30_days: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    price_lifetime: Decimal,
    download_link: &'a str,
    tutorial_video_link: &'a str,
    activation_process: &'a str,
}

impl ProductDraft {
    /// Prefill from an existing product for editing
    pub fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            prices: product.prices.clone(),
            software_download_link: product.software_download_link.clone().unwrap_or_default(),
            tutorial_video_link: product.tutorial_video_link.clone().unwrap_or_default(),
            apply_process: product.apply_process.clone().unwrap_or_default(),
            image: None,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::validation("Product name is required."));
        }
        if Plan::ALL
            .iter()
            .any(|plan| self.prices.price(*plan) < Decimal::ZERO)
        {
            return Err(StoreError::validation("Prices cannot be negative."));
        }
        Ok(())
    }

    fn body(&self) -> ProductBody<'_> {
        ProductBody {
            name: self.name.trim(),
            description: &self.description,
            price_1_day: self.prices.one_day,
            price_7_days: self.prices.seven_days,
            price_30_days: self.prices.thirty_days,
            price_lifetime: self.prices.lifetime,
            download_link: &self.software_download_link,
            tutorial_video_link: &self.tutorial_video_link,
            activation_process: &self.apply_process,
        }
    }

    fn to_form(&self) -> StoreResult<Form> {
        let mut form = Form::new()
            .text("name", self.name.trim().to_string())
            .text("description", self.description.clone());
        for plan in Plan::ALL {
            form = form.text(
                format!("price_{}", plan.as_str()),
                self.prices.price(plan).to_string(),
            );
        }
        form = form
            .text("download_link", self.software_download_link.clone())
            .text("tutorial_video_link", self.tutorial_video_link.clone())
            .text("activation_process", self.apply_process.clone());
        if let Some(image) = self.image.as_ref().filter(|i| !i.is_empty()) {
            form = form.part("image", image.to_part()?);
        }
        Ok(form)
    }
}

pub struct ProductCache {
    api: ApiClient,
    items: Collection<Product>,
}

impl ProductCache {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            items: Collection::new("product"),
        }
    }

    pub fn items(&self) -> &Collection<Product> {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<Product> {
        self.items.get(id)
    }

    /// Product for display; a deleted one degrades to a placeholder
    pub fn display(&self, id: &str) -> Product {
        self.items
            .get(id)
            .unwrap_or_else(|| Product::placeholder(id))
    }

    pub async fn fetch_all(&self) -> StoreResult<Vec<Product>> {
        let _loading = self.items.begin_load();
        let rows: Vec<WireProduct> = self.api.get("/products").await?;
        let products: Vec<Product> = rows.into_iter().map(product_from_wire).collect();
        self.items.replace_all(products.clone());
        Ok(products)
    }

    pub async fn create(&self, draft: &ProductDraft) -> StoreResult<Ack> {
        draft.validate()?;
        let _saving = self.items.begin_save(NEW_ITEM)?;
        let ack = self.api.post_multipart("/products", draft.to_form()?).await?;
        info!(name = %draft.name.trim(), "Product created");
        Ok(ack)
    }

    /// JSON update, or multipart when a new image is attached
    pub async fn update(&self, id: &str, draft: &ProductDraft) -> StoreResult<Ack> {
        draft.validate()?;
        let _saving = self.items.begin_save(id)?;
        let body = match draft.image.as_ref() {
            Some(image) if !image.is_empty() => Body::Multipart(draft.to_form()?),
            _ => Body::Json(serde_json::to_value(draft.body())?),
        };
        let ack = self
            .api
            .send(Method::PUT, &format!("/products/{}", id), body)
            .await?;
        info!(product_id = id, "Product updated");
        Ok(ack)
    }

    pub async fn delete(&self, id: &str) -> StoreResult<Ack> {
        let _saving = self.items.begin_save(id)?;
        let ack = self.api.delete(&format!("/products/{}", id)).await?;
        info!(product_id = id, "Product deleted");
        Ok(ack)
    }
}
