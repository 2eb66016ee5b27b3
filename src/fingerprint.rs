use sha1::{Digest, Sha1};

/// key 的字节数：取 SHA-1 摘要 (20 字节) 的前 16 字节
pub const KEY_BYTES: usize = 16;

/// key 的字符长度 (小写十六进制)
pub const KEY_LEN: usize = KEY_BYTES * 2;

/// 计算一组对比图的指纹 (key)
///
/// 摘要输入是三段字节的直接拼接，顺序固定：
/// 归一化后的左图 || 归一化后的右图 || 提交者身份 (UTF-8)。
/// 段与段之间没有分隔符，也没有长度前缀。
///
/// 纯函数：同样的输入永远得到同样的 32 位小写十六进制字符串；
/// 左右互换会得到不同的 key。
pub fn fingerprint(left: &[u8], right: &[u8], submitter: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(left);
    hasher.update(right);
    hasher.update(submitter.as_bytes());
    let digest = hasher.finalize();

    // 截断到 16 字节是既定的寻址方案，不可配置
    hex::encode(&digest[..KEY_BYTES])
}

/// 语法校验：`^[0-9a-f]{32}$`
///
/// 由表现层在查询之前调用，格式不对的 key 不应到达存储层。
pub fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_LEN && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
