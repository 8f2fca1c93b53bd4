use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("query param is empty")]
    EmptyParam,
}

/// One step of the redirect-target rewrite chain.
pub trait UrlRewriter: Send + Sync {
    fn rewrite(&self, target: &mut Url) -> Result<(), RewriteError>;
}

/// Sets a fixed query parameter to a fixed credential, overwriting any
/// existing value.
pub struct QueryTokenRewriter {
    pub param: String,
    pub token: String,
}

impl UrlRewriter for QueryTokenRewriter {
    fn rewrite(&self, target: &mut Url) -> Result<(), RewriteError> {
        if self.param.is_empty() {
            return Err(RewriteError::EmptyParam);
        }

        let existing: Vec<(String, String)> = target
            .query_pairs()
            .filter(|(k, _)| *k != self.param)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut pairs = target.query_pairs_mut();
        pairs.clear();
        for (k, v) in &existing {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(&self.param, &self.token);
        drop(pairs);

        Ok(())
    }
}

/// Applies rewriters in order, stopping at the first failure.
pub struct ChainRewriter(pub Vec<Box<dyn UrlRewriter>>);

impl UrlRewriter for ChainRewriter {
    fn rewrite(&self, target: &mut Url) -> Result<(), RewriteError> {
        for rewriter in &self.0 {
            rewriter.rewrite(target)?;
        }
        Ok(())
    }
}
