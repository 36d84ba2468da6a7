use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{Backend, BackendError};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Session {
    pub access_token: String,
    /// Seconds until `access_token` expires.
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug)]
pub enum SignUpOutcome {
    /// The account exists but the email address has to be confirmed first.
    ConfirmationRequired(User),
    SignedIn(Session),
}

impl SignUpOutcome {
    /// The sign-up response is a session when confirmation is disabled,
    /// otherwise the bare user object.
    fn from_value(value: Value) -> Result<Self, BackendError> {
        if value.get("access_token").is_some() {
            Ok(SignUpOutcome::SignedIn(serde_json::from_value(value)?))
        } else if let Some(user) = value.get("user") {
            Ok(SignUpOutcome::ConfirmationRequired(serde_json::from_value(
                user.clone(),
            )?))
        } else {
            Ok(SignUpOutcome::ConfirmationRequired(serde_json::from_value(
                value,
            )?))
        }
    }
}

impl Backend {
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let request = self
            .http
            .post(self.endpoint("auth/v1/signup")?)
            .json(&json!({ "email": email, "password": password }));

        let response = self.send(self.authorize(request, None)).await?;
        SignUpOutcome::from_value(response.json().await?)
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let request = self
            .http
            .post(self.endpoint("auth/v1/token")?)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));

        let response = self.send(self.authorize(request, None)).await?;
        Ok(response.json().await?)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), BackendError> {
        let request = self.http.post(self.endpoint("auth/v1/logout")?);
        self.send(self.authorize(request, Some(token))).await?;
        Ok(())
    }

    pub async fn get_user(&self, token: &str) -> Result<User, BackendError> {
        let request = self.http.get(self.endpoint("auth/v1/user")?);
        let response = self.send(self.authorize(request, Some(token))).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const USER_ID: &str = "6f1c3a2e-4b7d-4c1e-9a0b-2d5e8f7a1c3b";

    #[test]
    fn sign_up_with_confirmation() {
        let outcome = SignUpOutcome::from_value(json!({
            "id": USER_ID,
            "email": "a@b.c",
            "confirmation_sent_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        match outcome {
            SignUpOutcome::ConfirmationRequired(user) => {
                assert_eq!(user.id.to_string(), USER_ID);
                assert_eq!(user.email.as_deref(), Some("a@b.c"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn sign_up_without_confirmation() {
        let outcome = SignUpOutcome::from_value(json!({
            "access_token": "token",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": { "id": USER_ID, "email": "a@b.c" }
        }))
        .unwrap();

        assert!(matches!(outcome, SignUpOutcome::SignedIn(s) if s.expires_in == 3600));
    }

    #[test]
    fn sign_up_nested_user_without_session() {
        let outcome = SignUpOutcome::from_value(json!({
            "user": { "id": USER_ID },
            "session": null
        }))
        .unwrap();

        assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired(u) if u.email.is_none()));
    }
}
