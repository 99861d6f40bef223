// crates/shared/src/macros.rs

/// Declares the tools a toolbelt exposes and implements [`Toolbelt`] for it.
///
/// Each tool maps a registry name to an `async fn(&self, &serde_json::Value)
/// -> anyhow::Result<String>` method. Parameters are required unless followed
/// by `(optional)`.
///
/// [`Toolbelt`]: crate::toolbelts::Toolbelt
#[macro_export]
macro_rules! register_toolbelt {
    (
        $toolbelt_type:ty {
            description: $toolbelt_desc:literal,
            tools: {
                $(
                    $name:literal => $method:ident {
                        description: $desc:literal,
                        params: [$($param_name:literal: $param_type:literal => $param_desc:literal $(($optional:ident))?),* $(,)?]
                    }
                ),* $(,)?
            }
        }
    ) => {
        impl $crate::toolbelts::Toolbelt for $toolbelt_type {
            fn name(&self) -> &'static str {
                stringify!($toolbelt_type)
            }

            fn description(&self) -> &'static str {
                $toolbelt_desc
            }

            fn capabilities(self: ::std::sync::Arc<Self>) -> Vec<$crate::schemas::ToolCapability> {
                vec![
                    $(
                        {
                            let toolbelt = ::std::sync::Arc::clone(&self);
                            $crate::schemas::ToolCapability::new(
                                $crate::schemas::ToolSchema {
                                    name: $name,
                                    description: $desc,
                                    parameters: vec![
                                        $(
                                            $crate::schemas::ParameterSchema {
                                                name: $param_name,
                                                type_name: $param_type,
                                                description: $param_desc,
                                                required: $crate::__param_required!($($optional)?),
                                            }
                                        ),*
                                    ],
                                },
                                move |args: ::serde_json::Value| {
                                    let toolbelt = ::std::sync::Arc::clone(&toolbelt);
                                    async move { toolbelt.$method(&args).await }
                                },
                            )
                        }
                    ),*
                ]
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __param_required {
    () => {
        true
    };
    (optional) => {
        false
    };
}
