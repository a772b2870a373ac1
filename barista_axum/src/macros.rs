//! Extractors asserting that a presented token grants a permission

/// Constructs an extractor that authorizes a request for a single permission
///
/// For a more concise way to declare several guards, see
/// [`permission_guards!`][crate::permission_guards!].
///
/// ```
/// use barista_axum::permission_guard;
///
/// permission_guard!(GetDrinksDetail; "get:drinks-detail");
/// ```
///
/// The extractor reads the [`AuthGuard`](barista::AuthGuard) from router
/// state, so the state must either be an `AuthGuard` or implement
/// `FromRef` for one. On success the verified claims are handed to the
/// handler.
///
/// ```no_run
/// use axum::{extract::FromRef, routing::delete, Router};
/// use barista::AuthGuard;
/// use barista_axum::permission_guard;
///
/// permission_guard!(DeleteDrinks; "delete:drinks");
///
/// #[derive(Clone)]
/// struct AppState {
///     guard: AuthGuard,
/// }
///
/// impl FromRef<AppState> for AuthGuard {
///     fn from_ref(state: &AppState) -> Self {
///         state.guard.clone()
///     }
/// }
///
/// async fn delete_drink(DeleteDrinks(claims): DeleteDrinks) -> String {
///     format!("deleted by {}", claims.subject().unwrap_or("someone"))
/// }
///
/// fn router(guard: AuthGuard) -> Router {
///     Router::new()
///         .route("/drinks/:id", delete(delete_drink))
///         .with_state(AppState { guard })
/// }
/// ```
#[macro_export]
macro_rules! permission_guard {
    ($vis:vis $i:ident; $permission:literal) => {
        #[doc = concat!("Requires the `", $permission, "` permission, yielding the verified claims")]
        $vis struct $i($vis $crate::__private::DecodedPayload);

        impl $i {
            #[allow(dead_code)]
            $vis fn into_claims(self) -> $crate::__private::DecodedPayload {
                self.0
            }

            #[allow(dead_code)]
            $vis fn claims(&self) -> &$crate::__private::DecodedPayload {
                &self.0
            }
        }

        impl $crate::EndpointPermission for $i {
            fn permission() -> &'static $crate::__private::PermissionRef {
                $crate::__private::PermissionRef::from_str($permission)
            }
        }

        #[::axum::async_trait]
        impl<S> ::axum::extract::FromRequestParts<S> for $i
        where
            S: Send + Sync,
            $crate::__private::AuthGuard: ::axum::extract::FromRef<S>,
        {
            type Rejection = $crate::AuthRejection;

            async fn from_request_parts(
                req: &mut ::axum::http::request::Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let guard =
                    <$crate::__private::AuthGuard as ::axum::extract::FromRef<S>>::from_ref(state);
                $crate::__private::from_request(
                    req,
                    &guard,
                    <Self as $crate::EndpointPermission>::permission(),
                )
                .await
                .map(Self)
            }
        }
    };
}

/// Convenience macro for services that need to define many permission guards
///
/// ```
/// use barista_axum::permission_guards;
///
/// permission_guards! {
///     permission GetDrinksDetail = "get:drinks-detail";
///     permission PostDrinks = "post:drinks";
///     permission PatchDrinks = "patch:drinks";
///     pub permission DeleteDrinks = "delete:drinks";
/// }
/// ```
///
/// Each line defines a guard type, as with [`permission_guard!`].
#[macro_export]
macro_rules! permission_guards {
    ($($vis:vis permission $i:ident = $permission:literal);* $(;)?) => {
        $(
            $crate::permission_guard!($vis $i; $permission);
        )*
    };
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        extract::FromRequestParts,
        http::{header::AUTHORIZATION, request::Parts, Request, StatusCode},
        routing::get,
        Router,
    };
    use color_eyre::Result;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{test, AuthRejection, EndpointPermission};
    use barista::{AuthError, Jwt};

    permission_guard!(GetDrinksDetail; "get:drinks-detail");

    permission_guards! {
        permission PostDrinks = "post:drinks";
        permission DeleteDrinks = "delete:drinks";
    }

    fn request_without_token() -> Parts {
        Request::new(()).into_parts().0
    }

    fn request_with(token: &Jwt) -> Parts {
        Request::builder()
            .header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
            .body(())
            .expect("request is valid")
            .into_parts()
            .0
    }

    #[test]
    fn guards_carry_their_permission() {
        assert_eq!(GetDrinksDetail::permission().as_str(), "get:drinks-detail");
        assert_eq!(PostDrinks::permission().as_str(), "post:drinks");
        assert_eq!(DeleteDrinks::permission().as_str(), "delete:drinks");
    }

    #[tokio::test]
    async fn guard_with_permission_yields_claims() -> Result<()> {
        let token = test::token_with(&["get:drinks-detail"]);

        let GetDrinksDetail(claims) =
            GetDrinksDetail::from_request_parts(&mut request_with(&token), &test::guard()).await?;

        assert_eq!(claims.subject(), Some("auth0|barista"));
        Ok(())
    }

    #[tokio::test]
    async fn guard_without_token_is_bad_request() {
        match GetDrinksDetail::from_request_parts(&mut request_without_token(), &test::guard())
            .await
        {
            Err(rejection) => assert_eq!(rejection.error(), &AuthError::missing_authorization()),
            Ok(_) => panic!("Expected AuthRejection"),
        }
    }

    #[tokio::test]
    async fn guard_with_other_permission_is_unauthorized() {
        let token = test::token_with(&["get:drinks-detail"]);

        match DeleteDrinks::from_request_parts(&mut request_with(&token), &test::guard()).await {
            Err(rejection) => assert_eq!(rejection.into_inner(), AuthError::unauthorized()),
            Ok(_) => panic!("Expected AuthRejection"),
        }
    }

    #[tokio::test]
    async fn guard_with_expired_token_is_invalid_token() {
        let token = test::expired_token();

        match GetDrinksDetail::from_request_parts(&mut request_with(&token), &test::guard()).await
        {
            Err(rejection) => {
                assert_eq!(rejection, AuthRejection::from(AuthError::invalid_token()))
            }
            Ok(_) => panic!("Expected AuthRejection"),
        }
    }

    async fn drinks_detail(GetDrinksDetail(claims): GetDrinksDetail) -> String {
        claims.subject().unwrap_or_default().to_owned()
    }

    async fn create_drink(_: PostDrinks) -> StatusCode {
        StatusCode::CREATED
    }

    fn router() -> Router {
        Router::new()
            .route("/drinks", get(|| async { "public" }).post(create_drink))
            .route("/drinks-detail", get(drinks_detail))
            .with_state(test::guard())
    }

    async fn json_body(response: axum::response::Response) -> Result<Value> {
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    #[tokio::test]
    async fn public_route_needs_no_token() -> Result<()> {
        let response = router()
            .oneshot(Request::get("/drinks").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn protected_route_runs_handler_when_permitted() -> Result<()> {
        let token = test::token_with(&["get:drinks-detail"]);
        let response = router()
            .oneshot(
                Request::get("/drinks-detail")
                    .header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"auth0|barista");
        Ok(())
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_header() -> Result<()> {
        let response = router()
            .oneshot(Request::get("/drinks-detail").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await?,
            json!({ "success": false, "message": "Provide a valid token.", "error": "bad_request" })
        );
        Ok(())
    }

    #[tokio::test]
    async fn protected_route_rejects_wrong_scheme() -> Result<()> {
        let response = router()
            .oneshot(
                Request::get("/drinks-detail")
                    .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await?["error"], json!("invalid_token"));
        Ok(())
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_permission() -> Result<()> {
        let token = test::token_with(&["get:drinks-detail"]);
        let response = router()
            .oneshot(
                Request::post("/drinks")
                    .header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await?,
            json!({
                "success": false,
                "message": "You can not access this resource or page.",
                "error": "unauthorized",
            })
        );
        Ok(())
    }
}
