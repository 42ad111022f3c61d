//! Macro to instantiate a pool-dispatching ops interface over a database
//! trait.
//!
//! For every listed method this generates a `<name>_blocking` and a
//! `<name>_async` wrapper that ships the call onto the shared thread pool
//! and waits on a oneshot for the result.

/// Instantiates an ops struct named `$ops` over database trait `$tr`, with a
/// `Context` type local to the invoking module.
macro_rules! inst_ops {
    {
        ($ops:ident, $tr:path) {
            $($fname:ident($($aname:ident: $aty:ty),*) => $ret:ty;)*
        }
    } => {
        pub struct $ops {
            pool: ::threadpool::ThreadPool,
            inner: ::std::sync::Arc<dyn ExecIface + Sync + Send + 'static>,
        }

        paste::paste! {
            impl $ops {
                pub fn new<D>(pool: ::threadpool::ThreadPool, ctx: ::std::sync::Arc<Context<D>>) -> Self
                where
                    D: $tr + Sync + Send + 'static,
                {
                    Self { pool, inner: ctx }
                }

                $(
                    pub fn [<$fname _blocking>](&self, $($aname: $aty),*) -> ::tapnet_db::DbResult<$ret> {
                        let (resp_tx, resp_rx) = ::tokio::sync::oneshot::channel();
                        let inner = self.inner.clone();
                        self.pool.execute(move || {
                            let res = inner.$fname($($aname),*);
                            if resp_tx.send(res).is_err() {
                                ::tracing::warn!(op = stringify!($fname), "db op caller dropped");
                            }
                        });
                        match resp_rx.blocking_recv() {
                            Ok(v) => v,
                            Err(_) => Err(::tapnet_db::DbError::WorkerFailedStrangely),
                        }
                    }

                    pub async fn [<$fname _async>](&self, $($aname: $aty),*) -> ::tapnet_db::DbResult<$ret> {
                        let (resp_tx, resp_rx) = ::tokio::sync::oneshot::channel();
                        let inner = self.inner.clone();
                        self.pool.execute(move || {
                            let res = inner.$fname($($aname),*);
                            if resp_tx.send(res).is_err() {
                                ::tracing::warn!(op = stringify!($fname), "db op caller dropped");
                            }
                        });
                        match resp_rx.await {
                            Ok(v) => v,
                            Err(_) => Err(::tapnet_db::DbError::WorkerFailedStrangely),
                        }
                    }
                )*
            }
        }

        trait ExecIface {
            $(fn $fname(&self, $($aname: $aty),*) -> ::tapnet_db::DbResult<$ret>;)*
        }

        /// Context wrapping the concrete database handle.
        pub struct Context<D> {
            db: ::std::sync::Arc<D>,
        }

        impl<D> Context<D>
        where
            D: $tr + Sync + Send + 'static,
        {
            pub fn new(db: ::std::sync::Arc<D>) -> Self {
                Self { db }
            }

            pub fn into_ops(self, pool: ::threadpool::ThreadPool) -> $ops {
                $ops::new(pool, ::std::sync::Arc::new(self))
            }
        }

        impl<D> ExecIface for Context<D>
        where
            D: $tr + Sync + Send + 'static,
        {
            $(
                fn $fname(&self, $($aname: $aty),*) -> ::tapnet_db::DbResult<$ret> {
                    self.db.$fname($($aname),*)
                }
            )*
        }
    };
}

pub(crate) use inst_ops;
