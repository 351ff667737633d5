//! Product, price history and advertisement endpoints.

use reqwest::Method;
use tracing::instrument;

use market_pulse_core::{AdvertisementId, ApprovalStatus, Page, ProductId};

use super::types::{
    Advertisement, AdvertisementInput, Product, ProductInput, ProductQuery, StatusUpdate,
};
use super::{ApiClient, ApiError, Credentials};

impl ApiClient {
    // =========================================================================
    // Products
    // =========================================================================

    /// List products, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(page = query.page))]
    pub async fn products(
        &self,
        credentials: Option<&Credentials>,
        query: &ProductQuery,
    ) -> Result<Page<Product>, ApiError> {
        let mut url = self.endpoint(&["products"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("page", &query.page.to_string())
                .append_pair("limit", &query.limit.to_string());
            if let Some(sort) = query.sort {
                pairs.append_pair("sort", sort.as_str());
            }
            if let Some(status) = query.status {
                pairs.append_pair("status", status.as_str());
            }
        }
        self.execute(self.request(Method::GET, url, credentials))
            .await
    }

    /// Get a product (with its price history) by id.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product does not exist, or another
    /// error if the API request fails.
    #[instrument(skip(self), fields(product = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Product, ApiError> {
        let url = self.endpoint(&["products", id.as_str()])?;
        self.execute(self.request(Method::GET, url, None)).await
    }

    /// List the products a vendor has submitted, whatever their status.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(vendor = %credentials.email))]
    pub async fn vendor_products(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<Product>, ApiError> {
        let url = self.endpoint(&["vendors", credentials.email.as_str(), "products"])?;
        let page: Page<Product> = self
            .execute(self.request(Method::GET, url, Some(credentials)))
            .await?;
        Ok(page.items)
    }

    /// Submit a new product. It starts out pending review.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, product), fields(vendor = %credentials.email))]
    pub async fn create_product(
        &self,
        credentials: &Credentials,
        product: &ProductInput,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["products"])?;
        self.execute_empty(
            self.request(Method::POST, url, Some(credentials))
                .json(product),
        )
        .await
    }

    /// Update a product. The new price is appended to its price history.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, product), fields(product = %id))]
    pub async fn update_product(
        &self,
        credentials: &Credentials,
        id: &ProductId,
        product: &ProductInput,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["products", id.as_str()])?;
        self.execute_empty(
            self.request(Method::PUT, url, Some(credentials))
                .json(product),
        )
        .await
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(product = %id))]
    pub async fn delete_product(
        &self,
        credentials: &Credentials,
        id: &ProductId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["products", id.as_str()])?;
        self.execute_empty(self.request(Method::DELETE, url, Some(credentials)))
            .await
    }

    /// Approve or reject a product (admin). Rejections carry feedback.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, update), fields(product = %id, status = %update.status))]
    pub async fn set_product_status(
        &self,
        credentials: &Credentials,
        id: &ProductId,
        update: &StatusUpdate,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["products", id.as_str(), "status"])?;
        self.execute_empty(
            self.request(Method::PATCH, url, Some(credentials))
                .json(update),
        )
        .await
    }

    // =========================================================================
    // Advertisements
    // =========================================================================

    /// List advertisements, optionally filtered by status.
    ///
    /// The home page shows approved ads; admins list all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials))]
    pub async fn ads(
        &self,
        credentials: Option<&Credentials>,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<Advertisement>, ApiError> {
        let mut url = self.endpoint(&["ads"])?;
        if let Some(status) = status {
            url.query_pairs_mut().append_pair("status", status.as_str());
        }
        let page: Page<Advertisement> = self
            .execute(self.request(Method::GET, url, credentials))
            .await?;
        Ok(page.items)
    }

    /// List a vendor's own advertisements.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(vendor = %credentials.email))]
    pub async fn vendor_ads(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<Advertisement>, ApiError> {
        let url = self.endpoint(&["vendors", credentials.email.as_str(), "ads"])?;
        let page: Page<Advertisement> = self
            .execute(self.request(Method::GET, url, Some(credentials)))
            .await?;
        Ok(page.items)
    }

    /// Submit an advertisement for review.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, ad), fields(vendor = %credentials.email))]
    pub async fn create_ad(
        &self,
        credentials: &Credentials,
        ad: &AdvertisementInput,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["ads"])?;
        self.execute_empty(self.request(Method::POST, url, Some(credentials)).json(ad))
            .await
    }

    /// Approve or reject an advertisement (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(ad = %id))]
    pub async fn set_ad_status(
        &self,
        credentials: &Credentials,
        id: &AdvertisementId,
        status: ApprovalStatus,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["ads", id.as_str(), "status"])?;
        self.execute_empty(
            self.request(Method::PATCH, url, Some(credentials))
                .json(&StatusUpdate {
                    status,
                    feedback: None,
                }),
        )
        .await
    }
}
