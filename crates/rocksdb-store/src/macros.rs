//! Table definition macros over the rockbound schema traits.

macro_rules! define_table_without_codec {
    ($(#[$docs:meta])+ ( $table_name:ident ) $key:ty => $value:ty) => {
        $(#[$docs])+
        #[derive(Clone, Copy, Debug, Default)]
        pub(crate) struct $table_name;

        impl ::rockbound::schema::Schema for $table_name {
            const COLUMN_FAMILY_NAME: ::rockbound::schema::ColumnFamilyName =
                stringify!($table_name);
            type Key = $key;
            type Value = $value;
        }

        impl ::std::fmt::Display for $table_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", stringify!($table_name))
            }
        }
    };
}

macro_rules! impl_borsh_value_codec {
    ($table_name:ident, $value:ty) => {
        impl ::rockbound::schema::ValueCodec<$table_name> for $value {
            fn encode_value(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::rockbound::CodecError> {
                ::borsh::to_vec(self).map_err(|e| e.into())
            }

            fn decode_value(
                data: &[u8],
            ) -> ::std::result::Result<Self, ::rockbound::CodecError> {
                ::borsh::from_slice(data).map_err(|e| e.into())
            }
        }
    };
}

/// Borsh-encoded key and value.  Only suitable for point lookups; borsh key
/// encoding does not preserve ordering.
macro_rules! define_table_with_default_codec {
    ($(#[$docs:meta])+ ( $table_name:ident ) $key:ty => $value:ty) => {
        $crate::macros::define_table_without_codec!($(#[$docs])+ ( $table_name ) $key => $value);

        impl ::rockbound::schema::KeyEncoder<$table_name> for $key {
            fn encode_key(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::rockbound::CodecError> {
                ::borsh::to_vec(self).map_err(|e| e.into())
            }
        }

        impl ::rockbound::schema::KeyDecoder<$table_name> for $key {
            fn decode_key(
                data: &[u8],
            ) -> ::std::result::Result<Self, ::rockbound::CodecError> {
                ::borsh::from_slice(data).map_err(|e| e.into())
            }
        }

        impl ::rockbound::schema::SeekKeyEncoder<$table_name> for $key {
            fn encode_seek_key(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::rockbound::CodecError> {
                <Self as ::rockbound::schema::KeyEncoder<$table_name>>::encode_key(self)
            }
        }

        $crate::macros::impl_borsh_value_codec!($table_name, $value);
    };
}

/// Big-endian key encoding via [`crate::seek_key::SeekKey`] so iteration
/// order matches numeric key order.  Use for every height-keyed table.
macro_rules! define_table_with_seek_key_codec {
    ($(#[$docs:meta])+ ( $table_name:ident ) $key:ty => $value:ty) => {
        $crate::macros::define_table_without_codec!($(#[$docs])+ ( $table_name ) $key => $value);

        impl ::rockbound::schema::KeyEncoder<$table_name> for $key {
            fn encode_key(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::rockbound::CodecError> {
                Ok($crate::seek_key::SeekKey::to_seek_bytes(self))
            }
        }

        impl ::rockbound::schema::KeyDecoder<$table_name> for $key {
            fn decode_key(
                data: &[u8],
            ) -> ::std::result::Result<Self, ::rockbound::CodecError> {
                $crate::seek_key::SeekKey::from_seek_bytes(data)
            }
        }

        impl ::rockbound::schema::SeekKeyEncoder<$table_name> for $key {
            fn encode_seek_key(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::rockbound::CodecError> {
                Ok($crate::seek_key::SeekKey::to_seek_bytes(self))
            }
        }

        $crate::macros::impl_borsh_value_codec!($table_name, $value);
    };
}

pub(crate) use define_table_with_default_codec;
pub(crate) use define_table_with_seek_key_codec;
pub(crate) use define_table_without_codec;
pub(crate) use impl_borsh_value_codec;
