//! # 数据模型
//!
//! 控制平面的核心数据结构：数据集树、设备与GPU资源池、任务与建模尝试、
//! 以及与远程Worker交互的请求/响应格式。
//!
//! ## 设计原则
//!
//! - 状态字段（GPU状态、建模步骤、建模类型、引擎类型）均为封闭枚举，
//!   在持久化边界拒绝未知取值
//! - 参数文档在创建时解析为强类型的 [`ModelingParams`]，更新时重新序列化
//! - 所有时间字段使用 `DateTime<Utc>`

/// 为以文本形式存储的枚举实现SQLite的 `Type`/`Encode`/`Decode`。
///
/// 目标类型需提供 `as_str(&self) -> &'static str` 并实现 `FromStr`。
macro_rules! sqlite_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $ty {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $ty {
            fn decode(
                value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                s.parse::<$ty>().map_err(Into::into)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut <sqlx::Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub(crate) use sqlite_text_enum;

pub mod dataset;
pub mod device;
pub mod modeling;
pub mod params;
pub mod task;
pub mod worker;

pub use dataset::*;
pub use device::*;
pub use modeling::*;
pub use params::*;
pub use task::*;
pub use worker::*;
