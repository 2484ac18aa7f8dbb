use crate::user::{RegisterUserBody, RegisteredUserBody, TokenBody, UserBody};

use super::{ApiClient, ApiResponse};

pub struct AuthenticationService<'a> {
    client: &'a mut ApiClient,
}

impl<'a> AuthenticationService<'a> {
    pub fn new(client: &'a mut ApiClient) -> AuthenticationService<'a> {
        AuthenticationService { client }
    }

    /// Registers a tenant and, on success, keeps its token on the client.
    pub async fn register(
        &mut self,
        email: &str,
        company_name: Option<&str>,
    ) -> ApiResponse<RegisteredUserBody> {
        let body = RegisterUserBody {
            email: email.to_string(),
            company_name: company_name.map(str::to_string),
        };

        let response: ApiResponse<RegisteredUserBody> = self.client.post("/users", &body).await;
        if let Some(registered) = &response.data {
            self.client.set_token(Some(registered.token.clone()));
        }

        response
    }

    pub async fn current_user(&self) -> ApiResponse<UserBody> {
        self.client.get("/users/me").await
    }

    pub async fn refresh_token(&mut self) -> ApiResponse<TokenBody> {
        let response: ApiResponse<TokenBody> = self.client.post_empty("/users/me/token").await;
        if let Some(token) = &response.data {
            self.client.set_token(Some(token.token.clone()));
        }

        response
    }

    pub fn logout(&mut self) {
        self.client.set_token(None);
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.token().is_some()
    }
}
