//! 페이지 쿼리 문자열 파싱
//!
//! 같은 키가 여러 번 나오면 처음 위치에 마지막 값이 남습니다.
//! 키와 값은 퍼센트 디코딩됩니다.

use std::sync::LazyLock;

use regex::Regex;

use crate::codec::decode_uri_component;

/// `hct_ut[key]=value` 형식의 테스트 오버라이드 키
static OVERRIDE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^hct_ut\[(.+)\]$").expect("override key regex is valid"));

/// 파싱된 쿼리 파라미터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// `?a=1&b=2` 형식의 문자열을 파싱합니다. 앞의 `?`는 있어도 되고 없어도 됩니다.
    ///
    /// `=`가 없는 항목은 키와 값이 같습니다.
    pub fn parse(search: &str) -> Self {
        let mut params = Self::default();
        let search = search.strip_prefix('?').unwrap_or(search);
        for attr in search.split('&').filter(|a| !a.is_empty()) {
            let (key, value) = match attr.split_once('=') {
                Some((k, v)) => (k, v),
                None => (attr, attr),
            };
            let key = decode_uri_component(key);
            if key.is_empty() {
                continue;
            }
            params.insert(key, decode_uri_component(value));
        }
        params
    }

    /// 값을 넣습니다. 이미 있는 키는 위치를 유지하고 값만 바꿉니다.
    pub fn insert(&mut self, key: String, value: String) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// 키의 값을 반환합니다.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 모든 (키, 값) 쌍
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 주어진 키 목록에 속하는 파라미터만 반환합니다.
    pub fn filter_keys<'a>(
        &'a self,
        keys: &'a [&str],
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.iter().filter(move |(k, _)| keys.contains(k))
    }

    /// 주어진 키 중 하나라도 있는지 확인합니다.
    pub fn contains_any(&self, keys: &[&str]) -> bool {
        self.pairs.iter().any(|(k, _)| keys.contains(&k.as_str()))
    }

    /// `hct_ut[key]=value` 테스트 오버라이드를 추출합니다.
    pub fn test_overrides(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .filter_map(|(k, v)| {
                OVERRIDE_KEY
                    .captures(k)
                    .and_then(|caps| caps.get(1))
                    .map(|name| (name.as_str().to_owned(), v.clone()))
            })
            .collect()
    }

    /// 파라미터가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
