/// Lazy connection for the current request.
#[macro_export]
macro_rules! get_conn {
    ($state:expr) => {
        $crate::database::conn::LazyConn::new($state.db_pool.clone())
    };
}

/// Opens a transaction on a `LazyConn`, bailing out of the handler on failure.
#[macro_export]
macro_rules! create_tx {
    ($conn:expr) => {
        $conn
            .transaction()
            .await
            .map_err($crate::utils::response::AppError::from)?
    };
}

/// Implements `CsrfProtected` for forms with a `csrfmiddlewaretoken` field.
#[macro_export]
macro_rules! csrf_protected {
    ($($form:ty),+ $(,)?) => {
        $(
            impl $crate::utils::validate::CsrfProtected for $form {
                fn csrf_token(&self) -> &str {
                    &self.csrfmiddlewaretoken
                }
            }
        )+
    };
}
