//! User, role and vendor application endpoints.

use reqwest::Method;
use tracing::instrument;

use market_pulse_core::{ApprovalStatus, Email, Role, VendorApplicationId};

use super::types::{
    NewUser, RoleResponse, RoleUpdate, StatusUpdate, UserRecord, VendorApplication,
    VendorApplicationInput,
};
use super::{ApiClient, ApiError, Credentials};

impl ApiClient {
    // =========================================================================
    // Roles
    // =========================================================================

    /// Fetch the role of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend does not know
    /// the user.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn user_role(&self, credentials: &Credentials) -> Result<Role, ApiError> {
        let url = self.endpoint(&["users", credentials.email.as_str(), "role"])?;
        let response: RoleResponse = self
            .execute(self.request(Method::GET, url, Some(credentials)))
            .await?;
        Ok(response.role)
    }

    /// Change another user's role (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self, credentials), fields(target = %target))]
    pub async fn set_user_role(
        &self,
        credentials: &Credentials,
        target: &Email,
        role: Role,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["users", target.as_str(), "role"])?;
        self.execute_empty(
            self.request(Method::PATCH, url, Some(credentials))
                .json(&RoleUpdate { role }),
        )
        .await
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// List all users (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self, credentials))]
    pub async fn users(&self, credentials: &Credentials) -> Result<Vec<UserRecord>, ApiError> {
        let url = self.endpoint(&["users"])?;
        self.execute(self.request(Method::GET, url, Some(credentials)))
            .await
    }

    /// Register a freshly signed-up account with the backend.
    ///
    /// The backend creates the record with the `user` role; an existing
    /// record is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, credentials, user), fields(email = %user.email))]
    pub async fn create_user(
        &self,
        credentials: &Credentials,
        user: &NewUser,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["users"])?;
        self.execute_empty(self.request(Method::POST, url, Some(credentials)).json(user))
            .await
    }

    // =========================================================================
    // Vendor applications
    // =========================================================================

    /// Submit a request to become a vendor.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails (including a duplicate
    /// application, reported by the backend as a non-success status).
    #[instrument(skip(self, credentials, application), fields(email = %application.email))]
    pub async fn apply_for_vendor(
        &self,
        credentials: &Credentials,
        application: &VendorApplicationInput,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["vendor-applications"])?;
        self.execute_empty(
            self.request(Method::POST, url, Some(credentials))
                .json(application),
        )
        .await
    }

    /// List vendor applications (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self, credentials))]
    pub async fn vendor_applications(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<VendorApplication>, ApiError> {
        let url = self.endpoint(&["vendor-applications"])?;
        self.execute(self.request(Method::GET, url, Some(credentials)))
            .await
    }

    /// Approve or reject a vendor application (admin).
    ///
    /// Approval promotes the applicant to [`Role::Vendor`] on the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self, credentials), fields(application = %id))]
    pub async fn set_vendor_application_status(
        &self,
        credentials: &Credentials,
        id: &VendorApplicationId,
        status: ApprovalStatus,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["vendor-applications", id.as_str()])?;
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
