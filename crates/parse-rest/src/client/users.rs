//! User sessions: sign-up, login, third-party auth and logout.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use busbar_parse_client::{
    Error, ErrorKind, RequestMethod, RequestOption, RequestOptions, Result,
};

use crate::coding::{self, server_fields};
use crate::command::{Command, CommandBody};
use crate::identity::{IdentityContainer, SessionContext, SlotKind};
use crate::object::{self, ParseUser};

use super::objects::reconciling_command;

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    email: &'a str,
}

/// A command whose response becomes the current user.
///
/// `token` stands in when the response carries no session token.
fn session_command<U: ParseUser>(
    session: &Arc<SessionContext>,
    method: RequestMethod,
    path: impl Into<String>,
    base: Map<String, Value>,
    token: Option<String>,
) -> Command<U> {
    let session = Arc::clone(session);
    let base = Arc::new(base);
    Command::new(method, path, move |bytes: Bytes| {
        let session = Arc::clone(&session);
        let base = Arc::clone(&base);
        let fallback = token.clone();
        async move {
            let response: Map<String, Value> = serde_json::from_slice(&bytes)?;
            let (fields, token) = server_fields(response);
            let mut merged = (*base).clone();
            merged.extend(fields);
            merged.remove("password");
            let user = coding::from_map(merged.clone())?;
            session
                .set(
                    SlotKind::User,
                    IdentityContainer::new(merged, token.or(fallback)),
                )
                .await;
            Ok(user)
        }
    })
}

/// `{"authData": {<auth_type>: data}}`
fn auth_data_body(auth_type: &str, data: Value) -> Map<String, Value> {
    let mut auth = Map::new();
    auth.insert(auth_type.to_string(), data);
    let mut body = Map::new();
    body.insert("authData".to_string(), Value::Object(auth));
    body
}

impl super::ParseClient {
    /// Create a user on the server and make it the current user.
    #[instrument(skip(self, user, options))]
    pub async fn signup<U: ParseUser>(&self, user: &mut U, options: &RequestOptions) -> Result<()> {
        let fields = coding::to_map(&*user)?;
        let mut base = fields.clone();
        base.remove("password");
        let command = session_command::<U>(
            self.session(),
            RequestMethod::Post,
            object::endpoint(U::CLASS_NAME, None),
            base,
            None,
        )
        .body(CommandBody::Object {
            fields,
            keep_object_id: false,
        });
        *user = self.execute(&command, options).await?;
        info!("signed up");
        Ok(())
    }

    /// Log in with username and password.
    #[instrument(skip(self, password, options))]
    pub async fn login<U: ParseUser>(
        &self,
        username: &str,
        password: &str,
        options: &RequestOptions,
    ) -> Result<U> {
        let command = session_command::<U>(
            self.session(),
            RequestMethod::Post,
            "/login",
            Map::new(),
            None,
        )
        .json_body(&Credentials { username, password })?;
        let user = self.execute(&command, options).await?;
        info!("logged in");
        Ok(user)
    }

    /// Log in, or sign up, with third-party auth data.
    #[instrument(skip(self, auth_data, options))]
    pub async fn login_with<U: ParseUser>(
        &self,
        auth_type: &str,
        auth_data: Map<String, Value>,
        options: &RequestOptions,
    ) -> Result<U> {
        let body = auth_data_body(auth_type, Value::Object(auth_data));
        let command = session_command::<U>(
            self.session(),
            RequestMethod::Post,
            object::endpoint(U::CLASS_NAME, None),
            body.clone(),
            None,
        )
        .body(CommandBody::Json(Value::Object(body)));
        self.execute(&command, options).await
    }

    /// Log in as a new anonymous user.
    pub async fn login_anonymously<U: ParseUser>(&self, options: &RequestOptions) -> Result<U> {
        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        self.login_with("anonymous", data, options).await
    }

    /// Become the user owning `session_token`.
    #[instrument(skip(self, session_token, options))]
    pub async fn become_user<U: ParseUser>(
        &self,
        session_token: &str,
        options: &RequestOptions,
    ) -> Result<U> {
        let command = session_command::<U>(
            self.session(),
            RequestMethod::Get,
            "/users/me",
            Map::new(),
            Some(session_token.to_string()),
        );
        let options = options
            .clone()
            .with(RequestOption::SessionToken(session_token.to_string()));
        self.execute(&command, &options).await
    }

    /// The current user.
    ///
    /// With automatic login enabled and no current user, logs in
    /// anonymously first. Concurrent callers share that single login.
    pub async fn current_user<U: ParseUser>(&self) -> Result<U> {
        if let Some(container) = self.session().get(SlotKind::User).await {
            return coding::from_map(container.object);
        }
        if !self.config().enable_automatic_login {
            return Err(Error::new(ErrorKind::NoCurrentUser));
        }

        let _guard = self.auto_login.lock().await;
        if let Some(container) = self.session().get(SlotKind::User).await {
            return coding::from_map(container.object);
        }
        debug!("no current user, logging in anonymously");
        self.login_anonymously(&RequestOptions::new()).await
    }

    /// The current user's session token.
    pub async fn session_token(&self) -> Option<String> {
        self.session().session_token().await
    }

    /// End the current session.
    ///
    /// The current user and config are cleared even when the server call
    /// fails.
    #[instrument(skip(self, options))]
    pub async fn logout(&self, options: &RequestOptions) -> Result<()> {
        let result = match self.session().session_token().await {
            Some(token) => {
                let command = Command::<Value>::json(RequestMethod::Post, "/logout");
                let options = options.clone().with(RequestOption::SessionToken(token));
                self.execute(&command, &options).await.map(|_| ())
            }
            None => Ok(()),
        };
        self.session().clear(SlotKind::User).await;
        self.session().clear(SlotKind::Config).await;
        info!("logged out");
        result
    }

    /// Link third-party auth data to the current user, or log in with it
    /// when there is no current user.
    #[instrument(skip(self, auth_data, options))]
    pub async fn link<U: ParseUser>(
        &self,
        auth_type: &str,
        auth_data: Map<String, Value>,
        options: &RequestOptions,
    ) -> Result<U> {
        let Some(current) = self.session().get(SlotKind::User).await else {
            return self.login_with(auth_type, auth_data, options).await;
        };
        self.write_auth_data(current, auth_type, Value::Object(auth_data), options)
            .await
    }

    /// Remove third-party auth data from the current user.
    #[instrument(skip(self, options))]
    pub async fn unlink<U: ParseUser>(
        &self,
        auth_type: &str,
        options: &RequestOptions,
    ) -> Result<U> {
        let current = self
            .session()
            .get(SlotKind::User)
            .await
            .ok_or_else(|| Error::new(ErrorKind::NoCurrentUser))?;
        self.write_auth_data(current, auth_type, Value::Null, options)
            .await
    }

    /// Whether the current user has auth data for `auth_type`.
    pub async fn is_linked(&self, auth_type: &str) -> bool {
        self.session()
            .get(SlotKind::User)
            .await
            .and_then(|c| c.object.get("authData")?.get(auth_type).cloned())
            .is_some_and(|data| data.is_object())
    }

    /// Ask the server to email a password reset link.
    #[instrument(skip(self, email, options))]
    pub async fn request_password_reset(&self, email: &str, options: &RequestOptions) -> Result<()> {
        let command = Command::<Value>::json(RequestMethod::Post, "/requestPasswordReset")
            .json_body(&EmailRequest { email })?;
        self.execute(&command, options).await.map(|_| ())
    }

    /// Ask the server to resend the email verification link.
    #[instrument(skip(self, email, options))]
    pub async fn verification_email_request(
        &self,
        email: &str,
        options: &RequestOptions,
    ) -> Result<()> {
        let command = Command::<Value>::json(RequestMethod::Post, "/verificationEmailRequest")
            .json_body(&EmailRequest { email })?;
        self.execute(&command, options).await.map(|_| ())
    }

    async fn write_auth_data<U: ParseUser>(
        &self,
        current: IdentityContainer,
        auth_type: &str,
        data: Value,
        options: &RequestOptions,
    ) -> Result<U> {
        let object_id = current
            .object_id()
            .ok_or_else(|| Error::missing_identifier("current user has no objectId"))?
            .to_string();

        let mut base = current.object;
        let mut auth = match base.remove("authData") {
            Some(Value::Object(auth)) => auth,
            _ => Map::new(),
        };
        if data.is_null() {
            auth.remove(auth_type);
        } else {
            auth.insert(auth_type.to_string(), data.clone());
        }
        // Kept even when empty so the merge into the identity slot drops
        // an unlinked provider.
        base.insert("authData".to_string(), Value::Object(auth));

        let command = reconciling_command::<U>(
            self.session(),
            RequestMethod::Put,
            object::endpoint(U::CLASS_NAME, Some(&object_id)),
            base,
        )
        .body(CommandBody::Json(Value::Object(auth_data_body(auth_type, data))));
        self.execute(&command, options).await
    }
}
